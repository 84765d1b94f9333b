//! Fit-within layout math for the image path: scale to the target
//! resolution preserving aspect ratio, never cropping. Centering happens
//! in the shader, which scales UV coordinates about the quad center.

/// Largest size with the source aspect ratio that fits inside the canvas.
pub fn fit_within(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas_w.max(1) as f64;
    let ch = canvas_h.max(1) as f64;
    let scale = (cw / iw).min(ch / ih);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().max(1.0) as u32;
    let h = (ih * scale).round().max(1.0) as u32;
    (w.min(canvas_w.max(1)), h.min(canvas_h.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_image_is_letterboxed_top_and_bottom() {
        let (w, h) = fit_within(1920, 1080, 4000, 1000);
        assert_eq!(w, 1920);
        assert!(h < 1080);
    }

    #[test]
    fn tall_image_is_pillarboxed_on_a_landscape_canvas() {
        let (w, h) = fit_within(1920, 1080, 1000, 4000);
        assert_eq!(h, 1080);
        assert!(w < 1920);
    }

    #[test]
    fn small_image_upscales_to_fill_one_axis() {
        let (w, h) = fit_within(1920, 1080, 192, 108);
        assert_eq!((w, h), (1920, 1080));
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        let (w, h) = fit_within(1080, 1920, 1600, 900);
        let src_ratio = 1600.0 / 900.0;
        let out_ratio = f64::from(w) / f64::from(h);
        assert!((src_ratio - out_ratio).abs() < 0.01);
    }

    #[test]
    fn degenerate_sizes_never_panic() {
        assert_eq!(fit_within(0, 0, 0, 0), (1, 1));
    }
}
