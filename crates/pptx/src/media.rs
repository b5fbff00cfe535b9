//! Classification of media parts and stable ordering of their names.

use std::cmp::Ordering;

/// Directory holding embedded binaries.
pub const MEDIA_DIR: &str = "ppt/media/";

/// Extensions treated as video binaries.
pub const VIDEO_EXTS: &[&str] = &["mp4", "mov", "avi", "m4v", "wmv"];

/// Extensions treated as recompressible raster images.
pub const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "tiff", "bmp"];

/// Lowercased extension of a part name or URL path.
pub fn extension(name: &str) -> Option<String> {
    let file = basename(name);
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Last path segment.
pub fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

pub fn has_video_extension(name: &str) -> bool {
    extension(name).is_some_and(|e| VIDEO_EXTS.contains(&e.as_str()))
}

/// A video binary stored in the media directory.
pub fn is_video_part(part: &str) -> bool {
    part.starts_with(MEDIA_DIR) && has_video_extension(part)
}

/// A raster image stored in the media directory.
pub fn is_image_part(part: &str) -> bool {
    part.starts_with(MEDIA_DIR) && extension(part).is_some_and(|e| IMAGE_EXTS.contains(&e.as_str()))
}

/// Numeric-aware, case-insensitive comparison ("media2" < "media10").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ta, tb) = (natural_tokens(a), natural_tokens(b));
    for (x, y) in ta.iter().zip(tb.iter()) {
        let ord = match (x, y) {
            (Token::Num(n), Token::Num(m)) => n.cmp(m),
            (Token::Num(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Num(_)) => Ordering::Greater,
            (Token::Text(s), Token::Text(t)) => s.cmp(t),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ta.len().cmp(&tb.len())
}

#[derive(Debug)]
enum Token {
    Num(u128),
    Text(String),
}

fn natural_tokens(s: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        let digit = c.is_ascii_digit();
        let mut run = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() != digit {
                break;
            }
            run.push(c);
            chars.next();
        }
        tokens.push(if digit {
            Token::Num(run.parse().unwrap_or(u128::MAX))
        } else {
            Token::Text(run.to_lowercase())
        });
    }
    tokens
}
