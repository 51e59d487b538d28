pub mod config;
pub mod error;
pub mod ids;
pub mod slug;
pub mod time;
pub mod types;

pub use config::{Config, SourceConfig, SourceKind};
pub use error::HearthError;
pub use ids::{category_id, event_id, host_id, series_id};
pub use slug::{is_stop_word, name_key, normalize_tags, slugify};
pub use time::{chunk_window, day_window, time_of_day, Window};
pub use types::*;
