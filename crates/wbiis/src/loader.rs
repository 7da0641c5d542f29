//! Image loading and preprocessing into component color space.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array3;

use crate::types::{ColorImage, LabeledImage, VisionResult, CHANNELS};

/// Maximum value of an 8-bit sample.
const MAX_VAL: f64 = 255.0;

/// Produces preprocessed images from file paths.
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> VisionResult<ColorImage>;
}

/// Decodes a file, crops its centre square, resizes it, and maps it to
/// component color space.
#[derive(Debug, Clone, Copy)]
pub struct ComponentLoader {
    side: u32,
}

impl ComponentLoader {
    pub fn new(side: u32) -> Self {
        Self { side: side.max(1) }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Crop, resize, and convert an already decoded image.
    pub fn prepare(&self, img: &DynamicImage) -> VisionResult<ColorImage> {
        let square = crop_centre_square(img);
        let (w, h) = square.dimensions();
        let resized = if w == self.side && h == self.side {
            square
        } else {
            square.resize_exact(self.side, self.side, image::imageops::FilterType::Triangle)
        };
        to_component_space(&resized.to_rgb8())
    }
}

impl Default for ComponentLoader {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_IMAGE_SIDE)
    }
}

impl ImageSource for ComponentLoader {
    fn load(&self, path: &Path) -> VisionResult<ColorImage> {
        let img = image::open(path)?;
        self.prepare(&img)
    }
}

/// Crop the largest square centred in the image.
pub fn crop_centre_square(img: &DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    let side = w.min(h);
    let x = w / 2 - side / 2;
    let y = h / 2 - side / 2;
    img.crop_imm(x, y, side, side)
}

/// Map RGB pixels to the three component channels:
/// `C1 = (r + g + b) / 3`, `C2 = (r + (255 - b)) / 2`,
/// `C3 = (r + 2 (255 - g) + b) / 4`.
pub fn to_component_space(rgb: &RgbImage) -> VisionResult<ColorImage> {
    let (w, h) = rgb.dimensions();
    let mut data = Array3::<f64>::zeros((CHANNELS, h as usize, w as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(f64::from);
        let (y, x) = (y as usize, x as usize);
        data[[0, y, x]] = (r + g + b) / 3.0;
        data[[1, y, x]] = (r + (MAX_VAL - b)) / 2.0;
        data[[2, y, x]] = (r + 2.0 * (MAX_VAL - g) + b) / 4.0;
    }
    ColorImage::new(data)
}

/// Check if a file path points to a supported image format.
pub fn is_supported_format(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    matches!(
        ext.as_str(),
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

/// List supported image files in a directory, sorted by file name.
pub fn list_images(dir: &Path) -> VisionResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_format(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Identifier an image is stored under: its file name.
pub fn image_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Single-pass, in-order stream of loaded images.
///
/// Each call to `next` loads exactly one file; nothing is read ahead and the
/// stream cannot be restarted.
pub struct LazyImages<'a> {
    paths: std::vec::IntoIter<PathBuf>,
    source: &'a dyn ImageSource,
}

impl Iterator for LazyImages<'_> {
    type Item = VisionResult<LabeledImage>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(self.source.load(&path).map(|image| LabeledImage {
            id: image_id(&path),
            image,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// Stream `paths` through `source` one image at a time.
pub fn lazy_images(paths: Vec<PathBuf>, source: &dyn ImageSource) -> LazyImages<'_> {
    LazyImages {
        paths: paths.into_iter(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_landscape() {
        let img = DynamicImage::new_rgb8(300, 100);
        assert_eq!(crop_centre_square(&img).dimensions(), (100, 100));
    }

    #[test]
    fn test_crop_takes_centre() {
        let mut rgb = RgbImage::new(5, 3);
        rgb.put_pixel(1, 0, image::Rgb([255, 0, 0]));
        let cropped = crop_centre_square(&DynamicImage::ImageRgb8(rgb)).to_rgb8();
        assert_eq!(cropped.dimensions(), (3, 3));
        assert_eq!(cropped.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_component_space_values() {
        let mut rgb = RgbImage::new(1, 1);
        rgb.put_pixel(0, 0, image::Rgb([200, 100, 50]));
        let img = to_component_space(&rgb).unwrap();
        assert!((img.channel(0)[[0, 0]] - 350.0 / 3.0).abs() < 1e-12);
        assert_eq!(img.channel(1)[[0, 0]], (200.0 + 205.0) / 2.0);
        assert_eq!(img.channel(2)[[0, 0]], (200.0 + 310.0 + 50.0) / 4.0);
    }

    #[test]
    fn test_white_pixel_does_not_wrap() {
        let mut rgb = RgbImage::new(1, 1);
        rgb.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        let img = to_component_space(&rgb).unwrap();
        assert_eq!(img.channel(0)[[0, 0]], 255.0);
        assert_eq!(img.channel(1)[[0, 0]], 127.5);
        assert_eq!(img.channel(2)[[0, 0]], 127.5);
    }

    #[test]
    fn test_prepare_resizes() {
        let loader = ComponentLoader::new(32);
        let img = loader.prepare(&DynamicImage::new_rgb8(100, 60)).unwrap();
        assert_eq!((img.height(), img.width()), (32, 32));
    }

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_format(Path::new("test.png")));
        assert!(is_supported_format(Path::new("test.JPG")));
        assert!(!is_supported_format(Path::new("test.txt")));
        assert!(!is_supported_format(Path::new("noext")));
    }

    #[test]
    fn test_list_and_stream_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png", "c.png"] {
            DynamicImage::new_rgb8(8, 8).save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let paths = list_images(dir.path()).unwrap();
        assert_eq!(paths.len(), 3);

        let loader = ComponentLoader::new(8);
        let ids: Vec<String> = lazy_images(paths, &loader)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_stream_reports_missing_file() {
        let loader = ComponentLoader::new(8);
        let mut stream = lazy_images(vec![PathBuf::from("/nonexistent/x.png")], &loader);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }
}
