use qrcode::types::Color;
use qrcode::QrCode;

use crate::error::Result;

const QUIET_ZONE: usize = 2;

/// render `url` as a QR code made of half-block characters
///
/// Each text line holds two module rows. Dark modules are drawn as blanks on a
/// light background so the code scans on dark terminals too.
pub fn render_qr(url: &str) -> Result<String> {
    let qr = QrCode::new(url.as_bytes())?;
    let colors = qr.to_colors();
    let side = qr.width();
    let padded = side + 2 * QUIET_ZONE;

    let is_dark = |x: usize, y: usize| -> bool {
        if x < QUIET_ZONE || y < QUIET_ZONE || x >= side + QUIET_ZONE || y >= side + QUIET_ZONE {
            return false;
        }
        colors[(y - QUIET_ZONE) * side + (x - QUIET_ZONE)] == Color::Dark
    };

    let mut out = String::with_capacity(padded * (padded / 2 + 1) * 3);
    for y in (0..padded).step_by(2) {
        for x in 0..padded {
            let top = is_dark(x, y);
            let bottom = y + 1 < padded && is_dark(x, y + 1);
            out.push(match (top, bottom) {
                (false, false) => '█',
                (false, true) => '▀',
                (true, false) => '▄',
                (true, true) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}
