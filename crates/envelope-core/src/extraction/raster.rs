use crate::config::ImageFilterConfig;
use crate::error::EnvelopeError;
use crate::extraction::PageContent;
use crate::model::{ExtractionWarning, ImageCandidate, WarningKind};
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Scan every page image and keep the ones shaped like an address strip.
///
/// Images are visited top to bottom (descending bottom-left Y) so the
/// candidate order within a page matches reading order.
pub fn scan_candidates(
    pages: &[PageContent],
    filter: &ImageFilterConfig,
) -> (Vec<ImageCandidate>, Vec<ExtractionWarning>) {
    let mut candidates = Vec::new();
    let mut warnings = Vec::new();

    for page in pages {
        let mut images: Vec<_> = page.images.iter().collect();
        images.sort_by(|a, b| b.bounds.y_min.total_cmp(&a.bounds.y_min));

        let mut accepted = 1;
        for (i, img) in images.iter().enumerate() {
            let bottom_y = img.bounds.y_min;
            match prepare_address_image(&img.data, filter) {
                Ok(Some(data)) => {
                    let file_name = format!("{}-{}_{}.png", page.page_number, accepted, bottom_y);
                    tracing::debug!(page = page.page_number, file_name, "address image candidate");
                    candidates.push(ImageCandidate {
                        page: page.page_number,
                        file_name,
                        bottom_y,
                        data,
                    });
                    accepted += 1;
                }
                Ok(None) => {}
                Err(e) => warnings.push(ExtractionWarning::new(
                    None,
                    WarningKind::ImageSkipped,
                    format!("page {} image {}: {}", page.page_number, i + 1, e),
                )),
            }
        }
    }

    (candidates, warnings)
}

/// Decode, trim and crop a page image. Returns the PNG-encoded result when it
/// passes the size filter, `None` when it does not. Undecodable and entirely
/// white images are errors.
pub fn prepare_address_image(
    data: &[u8],
    filter: &ImageFilterConfig,
) -> Result<Option<Vec<u8>>, EnvelopeError> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| EnvelopeError::Image(e.to_string()))?
        .to_rgba8();

    let Some(mut bitmap) = trim_white(&decoded) else {
        return Err(EnvelopeError::Image("image is entirely white".into()));
    };

    if bitmap.width() >= filter.crop_left {
        let (w, h) = bitmap.dimensions();
        bitmap = imageops::crop_imm(&bitmap, filter.crop_left, 0, w - filter.crop_left, h).to_image();
    }

    if !accepts(bitmap.width(), bitmap.height(), filter) {
        return Ok(None);
    }

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(bitmap)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| EnvelopeError::Image(e.to_string()))?;
    Ok(Some(png))
}

fn accepts(width: u32, height: u32, filter: &ImageFilterConfig) -> bool {
    height > filter.min_height && height < filter.max_height && width / height > filter.min_aspect
}

/// Crop to the bounding box of pixels that are not pure white. Alpha is ignored.
/// Returns `None` for an entirely white image.
pub fn trim_white(img: &RgbaImage) -> Option<RgbaImage> {
    let (width, height) = img.dimensions();
    let mut left = width;
    let mut right = 0;
    let mut top = height;
    let mut bottom = 0;

    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b, _] = px.0;
        if r == 255 && g == 255 && b == 255 {
            continue;
        }
        left = left.min(x);
        right = right.max(x);
        top = top.min(y);
        bottom = bottom.max(y);
    }

    if left > right || top > bottom {
        return None;
    }

    Some(imageops::crop_imm(img, left, top, right - left + 1, bottom - top + 1).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::PageImage;
    use crate::model::BBox;
    use image::Rgba;

    fn strip(width: u32, height: u32, margin: u32) -> RgbaImage {
        RgbaImage::from_fn(width + 2 * margin, height + 2 * margin, |x, y| {
            if x >= margin && x < margin + width && y >= margin && y < margin + height {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    fn png(img: RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn page_image(y_min: f32, data: Vec<u8>) -> PageImage {
        PageImage {
            bounds: BBox {
                x_min: 0.0,
                y_min,
                x_max: 500.0,
                y_max: y_min + 20.0,
            },
            data,
        }
    }

    #[test]
    fn test_trim_white() {
        let trimmed = trim_white(&strip(30, 5, 4)).unwrap();
        assert_eq!(trimmed.dimensions(), (30, 5));
    }

    #[test]
    fn test_trim_all_white() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        assert!(trim_white(&img).is_none());
    }

    #[test]
    fn test_all_white_image_skipped_with_warning() {
        let filter = ImageFilterConfig::default();
        let blank = png(RgbaImage::from_pixel(1130, 45, Rgba([255, 255, 255, 255])));
        assert!(matches!(
            prepare_address_image(&blank, &filter),
            Err(EnvelopeError::Image(_))
        ));

        let pages = vec![PageContent {
            page_number: 1,
            height: 842.0,
            tokens: vec![],
            images: vec![page_image(300.0, blank)],
        }];
        let (candidates, warnings) = scan_candidates(&pages, &filter);
        assert!(candidates.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ImageSkipped);
        assert!(warnings[0].reason.contains("entirely white"));
    }

    #[test]
    fn test_address_strip_accepted_after_crop() {
        let filter = ImageFilterConfig::default();
        // 230 + 900 wide, 45 high: cropped to 900x45, ratio 20
        let data = png(strip(1130, 45, 3));
        let out = prepare_address_image(&data, &filter).unwrap().unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.width(), 900);
        assert_eq!(decoded.height(), 45);
    }

    #[test]
    fn test_wrong_height_rejected() {
        let filter = ImageFilterConfig::default();
        assert!(prepare_address_image(&png(strip(1130, 60, 0)), &filter)
            .unwrap()
            .is_none());
        assert!(prepare_address_image(&png(strip(1130, 40, 0)), &filter)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_undecodable_image_is_error() {
        let filter = ImageFilterConfig::default();
        assert!(prepare_address_image(b"not an image", &filter).is_err());
    }

    #[test]
    fn test_scan_orders_top_to_bottom() {
        let filter = ImageFilterConfig::default();
        let pages = vec![PageContent {
            page_number: 3,
            height: 842.0,
            tokens: vec![],
            images: vec![
                page_image(100.0, png(strip(1130, 45, 0))),
                page_image(400.0, png(strip(1130, 45, 0))),
                page_image(250.0, png(strip(50, 50, 0))),
                page_image(300.0, b"junk".to_vec()),
            ],
        }];

        let (candidates, warnings) = scan_candidates(&pages, &filter);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].bottom_y, 400.0);
        assert_eq!(candidates[0].file_name, "3-1_400.png");
        assert_eq!(candidates[1].file_name, "3-2_100.png");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ImageSkipped);
    }
}
