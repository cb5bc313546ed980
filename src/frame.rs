//! Decoding frames from files and from browser-style data URLs.

use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;

use crate::error::{Error, Result};

pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    Ok(image::open(path)?)
}

/// Decodes `data:image/<format>;base64,<payload>` or a bare base64 payload.
pub fn decode_data_url(data: &str) -> Result<DynamicImage> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| Error::InvalidFrame("data url has no payload".to_string()))?;
            if !header.starts_with("image/") || !header.ends_with(";base64") {
                return Err(Error::InvalidFrame(format!(
                    "unsupported data url header '{}'",
                    header
                )));
            }
            payload
        }
        None => data,
    };

    if payload.is_empty() {
        return Err(Error::InvalidFrame("no frame data provided".to_string()));
    }

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::InvalidFrame(format!("bad base64 payload: {}", e)))?;

    Ok(image::load_from_memory(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_base64(width: u32, height: u32) -> String {
        let image = DynamicImage::new_rgb8(width, height);
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_data_url() {
        let url = format!("data:image/png;base64,{}", png_base64(4, 3));
        let image = decode_data_url(&url).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn decodes_bare_payload() {
        let image = decode_data_url(&png_base64(2, 2)).unwrap();
        assert_eq!(image.width(), 2);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode_data_url(""), Err(Error::InvalidFrame(_))));
        assert!(matches!(
            decode_data_url("data:image/png;base64,"),
            Err(Error::InvalidFrame(_))
        ));
        assert!(matches!(
            decode_data_url("data:text/plain;base64,aGk="),
            Err(Error::InvalidFrame(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,!!!"),
            Err(Error::InvalidFrame(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,aGVsbG8="),
            Err(Error::Image(_))
        ));
    }
}
