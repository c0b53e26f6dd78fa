//! Drawing primitives for the annotated preview.
//!
//! Annotation only touches pixels; it never feeds back into the snapshot.

use image::{Rgb, RgbImage};
use perception::{Detections, Handedness};

use crate::stream::data::to_pixel;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const LEFT_HAND: Rgb<u8> = Rgb([255, 0, 0]);
const RIGHT_HAND: Rgb<u8> = Rgb([0, 0, 255]);

/// Glyph cell is 5x7 source pixels drawn at this scale.
const TEXT_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = 6 * TEXT_SCALE;
const GLYPH_HEIGHT: i32 = 7 * TEXT_SCALE;

pub(crate) fn annotate_frame(image: &mut RgbImage, detections: &Detections) {
    let width = image.width() as f32;
    let height = image.height() as f32;

    for face in &detections.faces {
        for lm in &face.landmarks {
            draw_point(image, to_pixel(lm.x, width), to_pixel(lm.y, height), 0, GREEN);
        }
        // Label baselines are y = 30 for the mouth and y = 60 + 30i for hands.
        draw_label(
            image,
            10,
            30 - GLYPH_HEIGHT,
            &format!("Mouth: {}", face.mouth.label()),
            GREEN,
        );
    }

    for (idx, hand) in detections.hands.iter().enumerate() {
        let color = hand_color(hand.handedness.label);
        for lm in &hand.landmarks {
            draw_point(image, to_pixel(lm.x, width), to_pixel(lm.y, height), 2, color);
        }
        draw_label(
            image,
            10,
            60 + idx as i32 * 30 - GLYPH_HEIGHT,
            &format!(
                "{} ({:.2})",
                hand.handedness.label.label(),
                hand.handedness.score
            ),
            GREEN,
        );

        if let (Some(gesture), Some(anchor)) = (&hand.gesture, hand.landmarks.last()) {
            let x = to_pixel(anchor.x, width);
            let y = to_pixel(anchor.y, height) - 10 - GLYPH_HEIGHT;
            draw_label(
                image,
                x,
                y.max(0),
                &format!("{} ({:.2})", gesture.category, gesture.score),
                WHITE,
            );
        }
    }
}

fn hand_color(hand: Handedness) -> Rgb<u8> {
    match hand {
        Handedness::Left => LEFT_HAND,
        Handedness::Right => RIGHT_HAND,
    }
}

/// Filled square marker of half-size `radius` centred on (x, y); clipped to the image.
fn draw_point(image: &mut RgbImage, x: i32, y: i32, radius: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for py in (y - radius)..=(y + radius) {
        if py < 0 || py >= height {
            continue;
        }
        for px in (x - radius)..=(x + radius) {
            if px < 0 || px >= width {
                continue;
            }
            *image.get_pixel_mut(px as u32, py as u32) = color;
        }
    }
}

/// Darken a rectangle so labels stay legible over bright video.
fn shade_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if left > right || top > bottom || right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as u16 * 3 / 10) as u8;
            }
        }
    }
}

pub(crate) fn label_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

fn draw_label(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    shade_rect(
        image,
        x - 2,
        y - 2,
        x + label_width(text),
        y + GLYPH_HEIGHT + 1,
    );

    let width = image.width() as i32;
    let height = image.height() as i32;
    let mut pen_x = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..TEXT_SCALE {
                        for dx in 0..TEXT_SCALE {
                            let px = pen_x + col * TEXT_SCALE + dx;
                            let py = y + row as i32 * TEXT_SCALE + dy;
                            if px >= 0 && px < width && py >= 0 && py < height {
                                *image.get_pixel_mut(px as u32, py as u32) = color;
                            }
                        }
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}
