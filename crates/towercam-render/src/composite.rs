use std::io::Cursor;

use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, ImageFormat, Rgba};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::debug;
use towercam_store::FreshnessRecord;

use crate::{CompositeBuilder, RenderError};

/// DejaVu Sans Mono, embedded so rendering never depends on system fonts.
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

const FONT_SIZE: f32 = 16.0;
const MARGIN_X: i32 = 10;
/// Distance from the bottom edge to the top of the text band.
const TEXT_TOP_FROM_BOTTOM: i32 = 26;
const TEXT_COLOUR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Writes temperature bottom-left and wind speed bottom-right over the frame.
#[derive(Debug, Clone)]
pub struct AnnotatedFrameBuilder {
    temperature_unit: String,
    wind_unit: String,
}

impl AnnotatedFrameBuilder {
    pub fn new(temperature_unit: impl Into<String>, wind_unit: impl Into<String>) -> Self {
        Self {
            temperature_unit: temperature_unit.into(),
            wind_unit: wind_unit.into(),
        }
    }

    pub fn temperature_label(&self, record: &FreshnessRecord) -> String {
        format!("{}{}", record.temperature, self.temperature_unit)
    }

    pub fn wind_label(&self, record: &FreshnessRecord) -> String {
        format!("{}{}", record.wind_speed, self.wind_unit)
    }
}

impl Default for AnnotatedFrameBuilder {
    fn default() -> Self {
        Self::new("\u{b0}C", " mph")
    }
}

impl CompositeBuilder for AnnotatedFrameBuilder {
    fn build(&self, record: &FreshnessRecord, frame: &[u8]) -> Result<Vec<u8>, RenderError> {
        let font = FontRef::try_from_slice(FONT_DATA).map_err(RenderError::Font)?;
        let scale = PxScale::from(FONT_SIZE);

        let mut img = image::load_from_memory(frame)
            .map_err(RenderError::Decode)?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let y = height as i32 - TEXT_TOP_FROM_BOTTOM;

        let temperature = self.temperature_label(record);
        draw_text_mut(&mut img, TEXT_COLOUR, MARGIN_X, y, scale, &font, &temperature);

        let wind = self.wind_label(record);
        let (wind_width, _) = text_size(scale, &font, &wind);
        let wind_x = width as i32 - MARGIN_X - wind_width as i32;
        draw_text_mut(&mut img, TEXT_COLOUR, wind_x, y, scale, &font, &wind);

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(RenderError::Encode)?;

        debug!(width, height, bytes = png.len(), "Built composite");
        Ok(png)
    }
}
