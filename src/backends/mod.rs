//! Topic backends — retrieval-augmented adapters behind narrow contracts.

pub mod essay;
pub mod restaurant;
pub mod retrieval;
pub mod traits;
pub mod youtube;

pub use essay::EssayBackend;
pub use restaurant::RestaurantBackend;
pub use traits::{BackendError, BackendResult, ConversationalBackend, QueryBackend};
pub use youtube::{is_youtube_link, HttpTranscriptFetcher, TranscriptFetcher, YoutubeBackend};
