//! Composition filter graphs.
//!
//! Each variant produces a three-stage graph: scale the source onto the
//! canvas, scale the template to fit, then overlay one on the other. The
//! template is the top layer when it carries alpha; an opaque template
//! becomes the bottom layer with the source composited on top.
//!
//! The square variant pads the source with a zero horizontal offset:
//! square templates expect the transparent window on the left edge, not
//! centered.

use crate::store::Variant;

/// Source-branch filter chain for a variant.
fn source_chain(variant: Variant) -> String {
    let (w, h) = variant.canvas();
    match variant {
        // Fit inside the full canvas, then center with padding.
        Variant::Vertical => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease:flags=lanczos,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,format=rgba"
        ),
        // Scale to canvas height, pad left-aligned horizontally.
        Variant::Square => format!(
            "scale=-2:{h}:flags=lanczos,setsar=1,\
             pad={w}:{h}:0:(oh-ih)/2,format=rgba"
        ),
        // Scale to canvas height, pad centered.
        Variant::Landscape => format!(
            "scale=-2:{h}:flags=lanczos,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,format=rgba"
        ),
    }
}

/// Template-branch filter chain for a variant.
fn template_chain(variant: Variant) -> String {
    let (w, h) = variant.canvas();
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease:flags=lanczos,\
         setsar=1,format=rgba"
    )
}

/// Build the full composition graph.
///
/// Input 0 is the source video, input 1 the template. With an alpha
/// template the source is the bottom layer; with an opaque template the
/// layers swap so the source stays visible.
pub fn composition_graph(variant: Variant, template_has_alpha: bool) -> String {
    let src = source_chain(variant);
    let tpl = template_chain(variant);
    let overlay = if template_has_alpha {
        "[src][tpl]overlay=0:0[outv]"
    } else {
        "[tpl][src]overlay=0:0[outv]"
    };
    format!("[0:v]{src}[src];[1:v]{tpl}[tpl];{overlay}")
}
