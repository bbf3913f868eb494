use super::basics::Resolution;

pub const PIXEL_ON: u32 = 0xFFFF_FFFF;
pub const PIXEL_OFF: u32 = 0x0000_0000;

/// Number of columns moved by the horizontal scroll instructions.
const HORIZONTAL_SCROLL: usize = 4;

/// A copy of the display taken under one lock, so the pixels always match
/// the dimensions.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u32>,
}

impl Frame {
    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        self.pixels[y * self.width + x] != PIXEL_OFF
    }
}

/// Monochrome display memory, one byte per cell, stored row-major.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    resolution: Resolution,
    cells: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(resolution: Resolution) -> FrameBuffer {
        FrameBuffer {
            resolution,
            cells: vec![0; resolution.width() * resolution.height()],
        }
    }

    pub fn width(&self) -> usize {
        self.resolution.width()
    }

    pub fn height(&self) -> usize {
        self.resolution.height()
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width() + x] != 0
    }

    /// Switches mode. The buffer is always reallocated blank, even when the
    /// mode does not change.
    pub fn resize(&mut self, resolution: Resolution) {
        *self = FrameBuffer::new(resolution);
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = 0);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        let shift = (rows * self.width()).min(self.cells.len());
        let len = self.cells.len();
        self.cells.copy_within(0..len - shift, shift);
        self.cells[..shift].iter_mut().for_each(|cell| *cell = 0);
    }

    pub fn scroll_right(&mut self) {
        let width = self.width();
        for row in self.cells.chunks_mut(width) {
            row.copy_within(0..width - HORIZONTAL_SCROLL, HORIZONTAL_SCROLL);
            row[..HORIZONTAL_SCROLL].iter_mut().for_each(|cell| *cell = 0);
        }
    }

    pub fn scroll_left(&mut self) {
        let width = self.width();
        for row in self.cells.chunks_mut(width) {
            row.copy_within(HORIZONTAL_SCROLL.., 0);
            row[width - HORIZONTAL_SCROLL..]
                .iter_mut()
                .for_each(|cell| *cell = 0);
        }
    }

    /// XORs a sprite onto the buffer and reports whether any lit cell was
    /// switched off.
    ///
    /// Each entry of `rows` holds one sprite row in its lowest `sprite_width`
    /// bits, most significant bit leftmost. The origin wraps around the
    /// screen, the rest of the sprite is clipped at the right and bottom edges.
    pub fn draw_sprite(&mut self, x: u8, y: u8, rows: &[u16], sprite_width: usize) -> bool {
        let width = self.width();
        let height = self.height();
        let x_start = x as usize % width;
        let y_start = y as usize % height;
        let mut collision = false;

        for (row_index, &row) in rows.iter().enumerate() {
            let py = y_start + row_index;
            if py >= height {
                break;
            }
            for bit in 0..sprite_width {
                let px = x_start + bit;
                if px >= width {
                    break;
                }
                if (row >> (sprite_width - 1 - bit)) & 1 == 0 {
                    continue;
                }
                let cell = &mut self.cells[py * width + px];
                if *cell != 0 {
                    collision = true;
                }
                *cell ^= 1;
            }
        }
        collision
    }

    pub fn frame(&self) -> Frame {
        Frame {
            width: self.width(),
            height: self.height(),
            pixels: self
                .cells
                .iter()
                .map(|&cell| if cell == 0 { PIXEL_OFF } else { PIXEL_ON })
                .collect(),
        }
    }
}
