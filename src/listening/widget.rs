//! Terminal-style SVG card for the current track.

use super::models::NowPlaying;

const MAX_TEXT_CHARS: usize = 30;
const PLAYING_COLOR: &str = "#1DB954";
const PAUSED_COLOR: &str = "#6b7280";

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cut to `MAX_TEXT_CHARS` characters, ending with "..." when shortened.
fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_TEXT_CHARS {
        return s.to_string();
    }
    let kept: String = s.chars().take(MAX_TEXT_CHARS - 3).collect();
    format!("{}...", kept)
}

/// Render the now-playing card. `album_art_b64` is embedded when present.
pub fn render_now_playing_svg(now_playing: &NowPlaying, album_art_b64: Option<&str>) -> String {
    // Truncate before escaping so entities are never cut in half.
    let title = escape_xml(&truncate(&now_playing.title));
    let artist = escape_xml(&truncate(&now_playing.artist));

    let (status, status_color) = if now_playing.is_playing {
        ("Now Playing", PLAYING_COLOR)
    } else {
        ("Paused", PAUSED_COLOR)
    };

    let (album_image, text_x) = match album_art_b64 {
        Some(b64) => (
            format!(
                r#"<image x="15" y="35" width="60" height="60" href="data:image/jpeg;base64,{}" preserveAspectRatio="xMidYMid slice"/>"#,
                b64
            ),
            85,
        ),
        None => (String::new(), 15),
    };

    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="110" viewBox="0 0 400 110">
  <rect width="400" height="110" rx="5" fill="#1a1a2e"/>
  <rect x="0" y="0" width="400" height="22" rx="5" fill="#16213e"/>
  <circle cx="12" cy="11" r="5" fill="#ff5f56"/>
  <circle cx="28" cy="11" r="5" fill="#ffbd2e"/>
  <circle cx="44" cy="11" r="5" fill="#27ca40"/>
  <text x="200" y="15" fill="#8892b0" font-family="monospace" font-size="11" text-anchor="middle">{status}</text>
  {album_image}
  <text x="{text_x}" y="58" fill="#ccd6f6" font-family="monospace" font-size="13" font-weight="bold">{title}</text>
  <text x="{text_x}" y="78" fill="#8892b0" font-family="monospace" font-size="11">{artist}</text>
  <circle cx="380" cy="55" r="8" fill="none" stroke="{status_color}" stroke-width="2"/>
  <polygon points="378,52 378,58 382,55" fill="{status_color}"/>
</svg>"##
    )
}
