//! Target rectangle of the product clip on the main video.

use ugc_models::{HorizontalAnchor, OverlayGeometry, PlacementPreference, VerticalAnchor};

use crate::error::{MediaError, MediaResult};

/// Largest margin that still leaves room for an overlay.
const MAX_MARGIN_PERCENT: f64 = 45.0;

/// Round down to an even pixel count (x264 needs even sizes), at least 2,
/// never above `limit`.
fn even_within(value: f64, limit: u32) -> u32 {
    let v = (value.max(0.0).floor() as u32) & !1;
    v.max(2).min(limit)
}

fn anchor_offset(space: u32, size: u32, margin: u32, start: bool, center: bool) -> u32 {
    let free = space.saturating_sub(size);
    let offset = if center {
        free / 2
    } else if start {
        margin
    } else {
        free.saturating_sub(margin)
    };
    offset.min(free)
}

/// Place a `clip_size` overlay on a `main_size` video.
///
/// `relative_size >= 1` covers the full frame and ignores the margin.
/// Otherwise the overlay is `main_width · relative_size` wide at the clip's
/// aspect ratio, shrunk as needed to fit inside the margins, then anchored
/// by the placement. The result always lies inside the main frame.
pub fn compute_geometry(
    main_size: (u32, u32),
    clip_size: (u32, u32),
    preference: &PlacementPreference,
    margin_percent: f64,
) -> MediaResult<OverlayGeometry> {
    let (main_w, main_h) = main_size;
    let (clip_w, clip_h) = clip_size;
    if main_w == 0 || main_h == 0 {
        return Err(MediaError::geometry(format!("main video has size {}x{}", main_w, main_h)));
    }
    if clip_w == 0 || clip_h == 0 {
        return Err(MediaError::geometry(format!("overlay clip has size {}x{}", clip_w, clip_h)));
    }
    let relative = preference.relative_size;
    if !relative.is_finite() || relative <= 0.0 {
        return Err(MediaError::geometry(format!("invalid relative size {}", relative)));
    }

    if relative >= 1.0 {
        return Ok(OverlayGeometry {
            x: 0,
            y: 0,
            width: main_w,
            height: main_h,
        });
    }

    let margin = if margin_percent.is_finite() {
        margin_percent.clamp(0.0, MAX_MARGIN_PERCENT)
    } else {
        0.0
    };
    let margin_x = (main_w as f64 * margin / 100.0).floor() as u32;
    let margin_y = (main_h as f64 * margin / 100.0).floor() as u32;
    let avail_w = main_w.saturating_sub(2 * margin_x).max(1) as f64;
    let avail_h = main_h.saturating_sub(2 * margin_y).max(1) as f64;

    let aspect = clip_w as f64 / clip_h as f64;
    let mut width = main_w as f64 * relative;
    let mut height = width / aspect;
    if width > avail_w {
        width = avail_w;
        height = width / aspect;
    }
    if height > avail_h {
        height = avail_h;
        width = height * aspect;
    }

    let width = even_within(width, main_w);
    let height = even_within(height, main_h);

    let (vertical, horizontal) = preference.placement.anchors();
    let x = anchor_offset(
        main_w,
        width,
        margin_x,
        horizontal == HorizontalAnchor::Left,
        horizontal == HorizontalAnchor::Center,
    );
    let y = anchor_offset(
        main_h,
        height,
        margin_y,
        vertical == VerticalAnchor::Top,
        vertical == VerticalAnchor::Middle,
    );

    Ok(OverlayGeometry { x, y, width, height })
}
