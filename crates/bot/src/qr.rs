use anyhow::{Context as _, Result};
use qrcode::{Color, EcLevel, QrCode};

/// Render `data` as a terminal QR code, two module rows per text line.
pub fn render(data: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .context("encoding pairing code as QR")?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    // Quiet zone of one block on every side.
    let blank = " ".repeat(width + 2);
    let mut out = String::with_capacity((width + 3) * (width / 2 + 3));
    out.push_str(&blank);
    out.push('\n');
    for row in (0..width).step_by(2) {
        out.push(' ');
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push_str(" \n");
    }
    out.push_str(&blank);
    Ok(out)
}
