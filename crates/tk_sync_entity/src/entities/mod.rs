mod video_record;

pub use video_record::{VideoKey, VideoRecord};
