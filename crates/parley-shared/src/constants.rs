/// Application name
pub const APP_NAME: &str = "Parley";

/// Document-store collection holding chat messages
pub const DEFAULT_COLLECTION: &str = "messages";

/// Field resolved by the backend to the authoritative creation time
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Recovery poll interval while connectivity is believed lost
pub const POLL_INTERVAL_MS: u64 = 1_500;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Local storage key of the last rendered message list
pub const SNAPSHOT_CACHE_KEY: &str = "messages_cache";

/// Name used when the start screen is submitted without one
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Owner segment of storage keys when the uid is empty
pub const DEFAULT_OWNER: &str = "user";

/// Chat background used when none (or an invalid one) is picked
pub const DEFAULT_BACKGROUND: &str = "#cfdcc6";

/// Background colours offered on the start screen
pub const BACKGROUND_PALETTE: [&str; 5] = ["#C1CCB8", "#FDE68A", "#BFDBFE", "#FECACA", "#E5E7EB"];

/// Object names used when a media reference carries no file name
pub const DEFAULT_IMAGE_NAME: &str = "image.jpg";
pub const DEFAULT_AUDIO_NAME: &str = "recording.m4a";
