use super::display::Frame;

/// Renders a display snapshot as text, `@` for lit pixels and a space for
/// unlit ones, rows separated by newlines.
pub fn render(frame: &Frame) -> String {
    let mut out = String::with_capacity((frame.width + 1) * frame.height);
    for y in 0..frame.height {
        if y > 0 {
            out.push('\n');
        }
        for x in 0..frame.width {
            out.push(if frame.is_lit(x, y) { '@' } else { ' ' });
        }
    }
    out
}
