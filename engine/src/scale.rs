/// Conditional per-frame downscaler.
///
/// Planning happens once per session from the actual capture dimensions and
/// the configured resolution target; execution is a nearest-neighbor BGRA
/// resample (smoothing disabled) applied per frame when the plan is not a
/// bypass. Upscaling is never performed.
use crate::config::ResolutionTarget;
use crate::frame::RawVideoFrame;

/// Output bounds for scaled frames. Bypassed (native) frames are untouched.
pub const MIN_OUT_WIDTH: u32 = 640;
pub const MIN_OUT_HEIGHT: u32 = 360;
pub const MAX_OUT_WIDTH: u32 = 1920;
pub const MAX_OUT_HEIGHT: u32 = 1080;

/// Standard rungs considered by `auto`, largest first.
const LADDER: [(u32, u32); 4] = [(1920, 1080), (1280, 720), (960, 540), (640, 360)];

/// Dimension tolerance under which the original counts as already at target.
const BYPASS_TOLERANCE: f64 = 0.02;

/// Resolved scaling decision for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePlan {
    pub out_width: u32,
    pub out_height: u32,
    /// True when frames are encoded natively, with no resample pass.
    pub bypass: bool,
}

impl ScalePlan {
    fn bypass_at(width: u32, height: u32) -> Self {
        Self { out_width: width, out_height: height, bypass: true }
    }
}

/// Picks output dimensions for a source of `orig_w`×`orig_h`.
pub fn plan(orig_w: u32, orig_h: u32, target: ResolutionTarget) -> ScalePlan {
    let (box_w, box_h) = match target {
        ResolutionTarget::Auto => auto_rung(orig_w, orig_h),
        ResolutionTarget::Uhd4k => (3840, 2160),
        ResolutionTarget::P1080 => (1920, 1080),
        ResolutionTarget::P720 => (1280, 720),
        ResolutionTarget::P540 => (960, 540),
    };

    if within_tolerance(orig_w, box_w) && within_tolerance(orig_h, box_h) {
        return ScalePlan::bypass_at(orig_w, orig_h);
    }

    // Shrink-only aspect-preserving fit into the target box.
    let scale = fit_scale(orig_w, orig_h, box_w, box_h);
    let fit_w = (orig_w as f64 * scale).round() as u32;
    let fit_h = (orig_h as f64 * scale).round() as u32;

    let out_w = align_dim(fit_w, box_w).clamp(MIN_OUT_WIDTH, MAX_OUT_WIDTH);
    let out_h = align_dim(fit_h, box_h).clamp(MIN_OUT_HEIGHT, MAX_OUT_HEIGHT);

    if out_w == orig_w && out_h == orig_h {
        // Smaller than the target and not upscaled: encode natively.
        return ScalePlan::bypass_at(orig_w, orig_h);
    }

    ScalePlan { out_width: out_w, out_height: out_h, bypass: false }
}

/// Largest ladder rung whose width fits the source's aspect-preserving fit
/// inside 1920×1080, with the bypass tolerance applied so near-misses
/// (e.g. a 1930-wide capture) still land on the rung they belong to.
fn auto_rung(orig_w: u32, orig_h: u32) -> (u32, u32) {
    let scale = fit_scale(orig_w, orig_h, MAX_OUT_WIDTH, MAX_OUT_HEIGHT);
    let fit_w = orig_w as f64 * scale;
    for &(rung_w, rung_h) in &LADDER {
        if rung_w as f64 <= fit_w * (1.0 + BYPASS_TOLERANCE) {
            return (rung_w, rung_h);
        }
    }
    LADDER[LADDER.len() - 1]
}

fn fit_scale(w: u32, h: u32, box_w: u32, box_h: u32) -> f64 {
    let sx = box_w as f64 / w as f64;
    let sy = box_h as f64 / h as f64;
    sx.min(sy).min(1.0)
}

fn within_tolerance(dim: u32, target: u32) -> bool {
    (dim as f64 - target as f64).abs() <= target as f64 * BYPASS_TOLERANCE
}

/// Rounds down to even, then to a multiple of 16. A dimension that already
/// sits exactly on its target-box edge is kept, so standard box edges like
/// 1080 survive alignment.
fn align_dim(dim: u32, box_edge: u32) -> u32 {
    if dim == box_edge {
        return dim;
    }
    let even = dim & !1;
    even - even % 16
}

/// Nearest-neighbor resample of a BGRA frame to `out_w`×`out_h`.
///
/// The scaled frame inherits the source timestamp and duration. It owns its
/// own buffer; the caller still owns (and releases) the original.
pub fn scale_frame(src: &RawVideoFrame, out_w: u32, out_h: u32) -> RawVideoFrame {
    let src_w = src.width as usize;
    let src_h = src.height as usize;
    let dst_w = out_w as usize;
    let dst_h = out_h as usize;

    let mut data = vec![0u8; dst_w * dst_h * 4];

    // Precompute the horizontal source index for each destination column.
    let col_map: Vec<usize> = (0..dst_w).map(|x| x * src_w / dst_w).collect();

    for y in 0..dst_h {
        let src_y = y * src_h / dst_h;
        let src_row = &src.data[src_y * src_w * 4..(src_y + 1) * src_w * 4];
        let dst_row = &mut data[y * dst_w * 4..(y + 1) * dst_w * 4];
        for (x, &src_x) in col_map.iter().enumerate() {
            dst_row[x * 4..x * 4 + 4].copy_from_slice(&src_row[src_x * 4..src_x * 4 + 4]);
        }
    }

    let mut out = RawVideoFrame::new(data, out_w, out_h, src.timestamp_us);
    out.duration_us = src.duration_us;
    out
}
