pub mod id;
pub mod time;

pub use id::{generate_id, generate_id_with_length};
pub use time::now_ms;
