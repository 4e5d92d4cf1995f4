//! Rendering pipeline: style -> layout -> paint -> raster

pub mod font;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod style;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// An encoded render of a document
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

impl Screenshot {
    /// PNG bytes in standard base64, no line wrapping
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png_data)
    }
}
