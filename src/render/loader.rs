//! Request-driven background image loader.
//!
//! The viewer sends decode jobs (path + target resolution) to a dedicated
//! thread so the render loop never blocks on disk or JPEG decode. Frames come
//! back as RGBA8 buffers already downscaled to fit the target; a file that
//! fails to decode is reported so the loop can skip it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::processing::layout::fit_within;

/// Message sent to the loader thread.
#[derive(Debug)]
pub enum LoaderMsg {
    /// Decode this path, scaled to fit within the given width/height.
    Decode { path: PathBuf, target: (u32, u32) },
    /// Stop the loader thread.
    Quit,
}

/// Outcome of one decode job.
#[derive(Debug)]
pub enum LoaderResult {
    Frame(PreparedFrame),
    Failed(PathBuf),
}

/// An RGBA8 frame sized to fit the target, ready for GPU upload.
#[derive(Debug)]
pub struct PreparedFrame {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Spawn the loader thread. It exits when the request channel closes or a
/// `Quit` message arrives.
pub fn spawn_loader(rx: Receiver<LoaderMsg>, tx: Sender<LoaderResult>) {
    thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            match msg {
                LoaderMsg::Quit => break,
                LoaderMsg::Decode { path, target } => {
                    let result = match decode_frame(&path, target) {
                        Ok(frame) => LoaderResult::Frame(frame),
                        Err(err) => {
                            warn!(path = %path.display(), "image decode failed: {err:#}");
                            LoaderResult::Failed(path)
                        }
                    };
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Decode an image to RGBA8, apply EXIF orientation, and downscale to fit
/// the target resolution while preserving aspect ratio.
pub fn decode_frame(path: &Path, target: (u32, u32)) -> Result<PreparedFrame> {
    let decoded = image::ImageReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("sniffing format of {}", path.display()))?
        .decode()
        .with_context(|| format!("decoding {}", path.display()))?;

    let mut rgba = decoded.to_rgba8();
    rgba = apply_exif_orientation(rgba, read_orientation(path).unwrap_or(1));

    let (src_w, src_h) = rgba.dimensions();
    let (dst_w, dst_h) = fit_within(target.0, target.1, src_w, src_h);
    let pixels = if (dst_w, dst_h) == (src_w, src_h) {
        rgba.into_raw()
    } else {
        resize_rgba(&rgba, dst_w, dst_h)?
    };

    debug!(
        path = %path.display(),
        width = dst_w,
        height = dst_h,
        "frame prepared"
    );
    Ok(PreparedFrame {
        path: path.to_path_buf(),
        width: dst_w,
        height: dst_h,
        pixels,
    })
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<Vec<u8>> {
    let (src_w, src_h) = source.dimensions();
    let src_view = fir::images::ImageRef::new(src_w, src_h, source.as_raw(), fir::PixelType::U8x4)
        .map_err(|err| anyhow!("building resize source view: {err}"))?;
    let mut dst = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst, Some(&options))
        .map_err(|err| anyhow!("resizing frame: {err}"))?;
    Ok(dst.into_vec())
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).map(|v| v as u16)
}

// EXIF orientation values 2-8 cover the mirrored and rotated layouts; 1 and
// anything unrecognized pass through unchanged.
fn apply_exif_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};
    match orientation {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    }
}
