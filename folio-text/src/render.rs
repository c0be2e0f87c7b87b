//! Greeked rasterization: every visible character becomes an ink block in its cell.

use image::{Rgba, RgbaImage};
use tracing::instrument;

use folio_core::{NormalizedRect, Pixmap};

use crate::book::Link;
use crate::grid::Grid;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([64, 64, 64, 255]);
const LINK_INK: Rgba<u8> = Rgba([32, 64, 192, 255]);

#[instrument(skip(lines, links, grid), fields(lines = lines.len()))]
pub fn rasterize(lines: &[String], links: &[&Link], grid: &Grid, width: u32, height: u32) -> Pixmap {
    let mut image = RgbaImage::from_pixel(width, height, PAPER);
    if width == 0 || height == 0 {
        return into_pixmap(image);
    }

    for (row, line) in lines.iter().enumerate().take(grid.rows) {
        for (column, c) in line.chars().enumerate().take(grid.columns) {
            if c.is_whitespace() {
                continue;
            }
            let linked = links
                .iter()
                .any(|link| link.line == row && (link.start..link.end).contains(&column));
            let ink = if linked { LINK_INK } else { INK };
            fill(&mut image, glyph_box(grid.cell(column, row)), ink);
        }
    }
    into_pixmap(image)
}

/// Shrinks a cell to the part a glyph body would cover.
fn glyph_box(cell: NormalizedRect) -> NormalizedRect {
    let dx = cell.width() * 0.15;
    let dy = cell.height() * 0.25;
    NormalizedRect::new(cell.left + dx, cell.top + dy, cell.right - dx, cell.bottom - dy)
}

fn fill(image: &mut RgbaImage, area: NormalizedRect, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    let x0 = ((area.left * width as f64).floor() as u32).min(width - 1);
    let y0 = ((area.top * height as f64).floor() as u32).min(height - 1);
    // Always cover at least one pixel so tiny thumbnails still show text.
    let x1 = ((area.right * width as f64).ceil() as u32).clamp(x0 + 1, width);
    let y1 = ((area.bottom * height as f64).ceil() as u32).clamp(y0 + 1, height);
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}

fn into_pixmap(image: RgbaImage) -> Pixmap {
    let (width, height) = image.dimensions();
    Pixmap {
        width,
        height,
        pixels: image.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::TextSettings;

    fn grid() -> Grid {
        Grid::new(&TextSettings {
            columns: 4,
            lines_per_page: 2,
            threaded: false,
        })
    }

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * pixmap.width + x) * 4) as usize;
        pixmap.pixels[offset..offset + 4].try_into().unwrap()
    }

    fn center_of(grid: &Grid, column: usize, row: usize, width: u32, height: u32) -> (u32, u32) {
        let (x, y) = grid.cell(column, row).center();
        ((x * width as f64) as u32, (y * height as f64) as u32)
    }

    #[test]
    fn ink_lands_only_on_visible_characters() {
        let grid = grid();
        let lines = vec!["a b".to_string()];
        let pixmap = rasterize(&lines, &[], &grid, 200, 200);
        assert_eq!(pixmap.byte_len(), 200 * 200 * 4);

        let (x, y) = center_of(&grid, 0, 0, 200, 200);
        assert_eq!(pixel(&pixmap, x, y), INK.0);
        let (x, y) = center_of(&grid, 1, 0, 200, 200);
        assert_eq!(pixel(&pixmap, x, y), PAPER.0);
        assert_eq!(pixel(&pixmap, 0, 0), PAPER.0);
    }

    #[test]
    fn links_use_their_own_ink() {
        let grid = grid();
        let link = Link {
            page: 0,
            line: 1,
            start: 0,
            end: 2,
            url: "http://x".into(),
        };
        let lines = vec![String::new(), "abcd".to_string()];
        let pixmap = rasterize(&lines, &[&link], &grid, 200, 200);
        let (x, y) = center_of(&grid, 1, 1, 200, 200);
        assert_eq!(pixel(&pixmap, x, y), LINK_INK.0);
        let (x, y) = center_of(&grid, 2, 1, 200, 200);
        assert_eq!(pixel(&pixmap, x, y), INK.0);
    }

    #[test]
    fn empty_target_is_not_an_error() {
        let pixmap = rasterize(&["x".to_string()], &[], &grid(), 0, 10);
        assert_eq!(pixmap.byte_len(), 0);
    }
}
