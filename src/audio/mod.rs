pub mod analysis;
pub mod decode;
pub mod features;
pub mod flux;
pub mod frames;
pub mod spectrum;
pub mod timing;
pub mod window;
