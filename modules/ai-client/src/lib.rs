pub mod claude;
pub mod openai;
pub mod schema;
pub mod traits;

pub use claude::Claude;
pub use openai::OpenAi;
pub use schema::StructuredOutput;
pub use traits::EmbedAgent;
