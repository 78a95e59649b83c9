pub mod camera;
pub mod chat_llm;
pub mod db;
pub mod emotion_llm;
pub mod memory;
pub mod sst;

pub use camera::FrameDirectoryCameraFactory;
pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use emotion_llm::OpenAiEmotionAdapter;
pub use memory::InMemorySink;
pub use sst::OpenAiSstAdapter;
