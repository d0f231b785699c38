use std::time::Duration;

/// Lifetime of every `image:<id>` and `user_images:<owner>` cache entry.
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default lifetime of signed object-store read URLs.
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Storage folder for uploaded originals.
pub const IMAGES_FOLDER: &str = "images";

/// Storage folder for worker output.
pub const TRANSFORMED_FOLDER: &str = "transformed";

/// Prefix given to the file name of a derivative saved under a new id.
pub const DERIVATIVE_NAME_PREFIX: &str = "transformed-";

/// Distance between a watermark and the image edge it is anchored to.
pub const WATERMARK_MARGIN_PX: u32 = 10;
