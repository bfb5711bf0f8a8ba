use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::AppError;

/// Minimum edge of the rendered code, in pixels.
const QR_MIN_SIZE: u32 = 300;

/// Renders `payload` as a PNG and returns it as a `data:` URL.
pub fn qr_data_url(payload: &str) -> Result<String, AppError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| AppError::Internal(format!("QR encoding failed: {e}")))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AppError::Internal(format!("QR image encoding failed: {e}")))?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}
