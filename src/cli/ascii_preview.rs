use crate::core::detector::FaceBox;
use crossterm::terminal;
use image::DynamicImage;

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

/// Renders a selected picture as text, with the detected face boxed.
pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height
                .unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2))
                .max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn render(&self, image: &DynamicImage, faces: &[FaceBox]) -> String {
        let mut grid = self.image_to_ascii(image);
        let (img_width, img_height) = (image.width() as f32, image.height() as f32);

        match faces.first() {
            Some(face) => {
                self.draw_face_box(&mut grid, face, img_width, img_height);
                if faces.len() > 1 {
                    let label = format!("+{} more", faces.len() - 1);
                    self.overlay_text(&mut grid, &label, self.width / 2, 0);
                }
            }
            None => self.overlay_text(&mut grid, "No face detected", self.width / 2, self.height / 2),
        }

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        // Terminal cells are about twice as tall as wide; sampling per cell
        // keeps the picture's proportions on screen.
        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let start_x = center_x.saturating_sub(text.chars().count() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32) {
        let scale_x = |v: f32| (((v / img_width) * self.width as f32) as usize).min(self.width - 1);
        let scale_y = |v: f32| (((v / img_height) * self.height as f32) as usize).min(self.height - 1);

        let (x1, x2) = (scale_x(face.x1.max(0.0)), scale_x(face.x2.max(0.0)));
        let (y1, y2) = (scale_y(face.y1.max(0.0)), scale_y(face.y2.max(0.0)));
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in (x1 + 1)..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }

        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence: 0.9 }
    }

    #[test]
    fn renders_requested_dimensions() {
        let renderer = AsciiRenderer::new(Some(20), Some(10));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])));
        let out = renderer.render(&image, &[face(10.0, 10.0, 90.0, 90.0)]);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| l.chars().count() == 20));
        assert!(out.contains('┌'));
        assert!(out.contains('┘'));
    }

    #[test]
    fn marks_missing_face() {
        let renderer = AsciiRenderer::new(Some(30), Some(8));
        let image = DynamicImage::ImageRgb8(RgbImage::new(50, 50));
        let out = renderer.render(&image, &[]);
        assert!(out.contains("No face detected"));
    }
}
