pub mod analysis;
pub mod chroma;
pub mod decode;
pub mod features;
pub mod fetch;
pub mod key;
pub mod progress;
pub mod tempo;
pub mod tracker;
pub mod vector;
