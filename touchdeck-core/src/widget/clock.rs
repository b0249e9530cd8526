//! Studio clock: HH:MM in a slanted 5x7 dot matrix, a blinking colon, and
//! a ring of sixty second dots.

use std::f32::consts::PI;

use chrono::Timelike;

use crate::canvas::Painter;
use crate::color::{Rgba, hex};
use crate::geometry::Rect;

use super::Frame;

const DIGITS: [&str; 7] = [
    ".###.|..#..|.###.|#####|...#.|#####|..##.|#####|.###.|.###.",
    "#...#|.##..|#...#|...#.|..##.|#....|.#...|#...#|#...#|#...#",
    "#...#|..#..|....#|..#..|.#.#.|####.|#....|....#|#...#|#...#",
    "#...#|..#..|...#.|.###.|#..#.|....#|####.|...#.|.###.|.####",
    "#...#|..#..|..#..|....#|#####|....#|#...#|..#..|#...#|....#",
    "#...#|..#..|.#...|#...#|...#.|#...#|#...#|..#..|#...#|...#.",
    ".###.|.###.|#####|.###.|...#.|.###.|.###.|..#..|.###.|.##..",
];

/// The 7 rows of 5 dots for `digit` (0-9); out-of-range digits are blank.
pub fn digit_pattern(digit: u32) -> [[bool; 5]; 7] {
    let mut out = [[false; 5]; 7];
    if digit > 9 {
        return out;
    }
    for (y, row) in DIGITS.iter().enumerate() {
        if let Some(cells) = row.split('|').nth(digit as usize) {
            for (x, c) in cells.chars().take(5).enumerate() {
                out[y][x] = c == '#';
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockStyle {
    pub background: Rgba,
    /// Background corner rounding, 0.0 square to 1.0 circle.
    pub rounding: f32,
    pub color: Rgba,
    /// Alpha of unlit dots.
    pub ambient: f32,
    /// Share of the radius reserved for the seconds ring.
    pub second_size: f32,
    pub second_radius: f32,
    pub text_size: f32,
    pub text_radius: f32,
    pub text_slant: f32,
    pub text_space: f32,
}

impl Default for ClockStyle {
    fn default() -> Self {
        Self {
            background: hex("111"),
            rounding: 1.0,
            color: hex("f30"),
            ambient: 0.15,
            second_size: 0.2,
            second_radius: 0.6,
            text_size: 1.0,
            text_radius: 0.8,
            text_slant: 0.1,
            text_space: 0.75,
        }
    }
}

/// What a dot shows.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DotRole {
    /// Lit once the seconds counter reaches this value.
    Second(u32),
    /// Colon dot, lit in the first half of each second.
    Colon,
    /// `slot` is the digit position (0, 1, 3, 4), `x`/`y` the bitmap cell.
    Digit { slot: usize, x: usize, y: usize },
}

#[derive(Debug, Clone, Copy)]
struct Dot {
    cx: f32,
    cy: f32,
    radius: f32,
    role: DotRole,
}

#[derive(Debug, Clone, Default)]
pub struct Clock {
    pub style: ClockStyle,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(style: ClockStyle) -> Self {
        Self { style }
    }

    fn dots(&self, rect: Rect) -> Vec<Dot> {
        let s = &self.style;
        let (cx, cy) = rect.center();
        let mut r = rect.w.min(rect.h) * 0.5;
        let mut dots = Vec::with_capacity(62 + 4 * 35);

        if s.second_size > 0.0 {
            let r_cen = r * (1.0 - s.second_size * 0.5);
            let radius = (r - r_cen).min(r_cen * PI / 60.0) * s.second_radius;
            r *= 1.0 - s.second_size;
            for i in 0..60 {
                let a = i as f32 * PI / 30.0;
                dots.push(Dot {
                    cx: cx + r_cen * a.sin(),
                    cy: cy - r_cen * a.cos(),
                    radius,
                    role: DotRole::Second(i),
                });
            }
        }

        let slant = -s.text_slant;
        let dist = r / (2.0 * s.text_space + 3.0 * slant.abs() + 10.35).hypot(3.35) * s.text_size;
        let radius = dist * s.text_radius * 0.5;
        let dot_slant = dist * slant;
        let gap = dist * s.text_space;

        for (dx, dy) in [(-dot_slant, -dist), (dot_slant, dist)] {
            dots.push(Dot {
                cx: cx + dx,
                cy: cy + dy,
                radius,
                role: DotRole::Colon,
            });
        }

        let top_x = cx - 3.0 * dot_slant;
        let top_y = cy - 3.0 * dist;
        let origins = [
            (0, top_x - 10.0 * dist - 2.0 * gap),
            (1, top_x - 5.0 * dist - gap),
            (3, top_x + dist + gap),
            (4, top_x + 6.0 * dist + 2.0 * gap),
        ];
        for (slot, ox) in origins {
            for y in 0..7 {
                for x in 0..5 {
                    dots.push(Dot {
                        cx: ox + y as f32 * dot_slant + x as f32 * dist,
                        cy: top_y + y as f32 * dist,
                        radius,
                        role: DotRole::Digit { slot, x, y },
                    });
                }
            }
        }
        dots
    }

    pub fn render(&self, painter: &mut Painter<'_>, rect: Rect, frame: &Frame<'_>) {
        let wall = frame.wall;
        let (hour, minute, second) = (wall.hour(), wall.minute(), wall.second());
        let first_half = wall.nanosecond() < 500_000_000;
        let digits = [hour / 10, hour % 10, 0, minute / 10, minute % 10];
        let patterns = digits.map(digit_pattern);

        let lit = self.style.color;
        let dim = lit.alpha(self.style.ambient);
        let r = rect.w.min(rect.h) * 0.5;
        painter.fill(rect, self.style.background, (r * self.style.rounding).round());

        for dot in self.dots(rect) {
            let on = match dot.role {
                DotRole::Second(i) => second >= i,
                DotRole::Colon => first_half,
                DotRole::Digit { slot, x, y } => patterns[slot][y][x],
            };
            let d = Rect::from_edges(
                dot.cx - dot.radius,
                dot.cy - dot.radius,
                dot.cx + dot.radius,
                dot.cy + dot.radius,
            );
            painter.fill(d, if on { lit } else { dim }, dot.radius);
        }
    }
}
