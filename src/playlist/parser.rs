//! Line-oriented HLS playlist helpers
//!
//! Deliberately not a full M3U8 parser: the rewrite keeps every line it does not
//! understand byte-for-byte, which a parse/serialize round trip would not.

use crate::utils::url::UrlUtils;

/// Playlist header tag; every rewritten playlist starts with it.
pub const PLAYLIST_HEADER: &str = "#EXTM3U";

/// Tags that signal an ad-insertion boundary. Matched on the tag name only.
pub const AD_MARKER_TAGS: &[&str] = &[
    "#EXT-X-DISCONTINUITY",
    "#EXT-X-CUE-OUT",
    "#EXT-X-CUE-OUT-CONT",
    "#EXT-X-CUE-IN",
    "#EXT-X-SCTE35",
    "#EXT-X-OATCLS-SCTE35",
    "#EXT-OATCLS-SCTE35",
    "#EXT-X-ASSET",
];

/// Tags carrying a `URI="..."` attribute that must be made absolute.
pub const URI_ATTRIBUTE_TAGS: &[&str] = &["#EXT-X-KEY", "#EXT-X-SESSION-KEY", "#EXT-X-MAP"];

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const SEGMENT_INFO_TAG: &str = "#EXTINF";

/// Tag name of a `#...` line: everything before the first `:`.
pub fn tag_name(line: &str) -> &str {
    match line.find(':') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

pub fn is_ad_marker(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('#') && AD_MARKER_TAGS.contains(&tag_name(line))
}

/// A master playlist declares stream variants.
pub fn is_master_playlist(text: &str) -> bool {
    text.lines().any(|l| tag_name(l.trim()) == STREAM_INF_TAG)
}

/// Number of segment URIs announced by `#EXTINF` tags.
pub fn segment_count(text: &str) -> usize {
    let mut pending_segment = false;
    let mut count = 0usize;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if tag_name(line) == SEGMENT_INFO_TAG {
                pending_segment = true;
            }
            continue;
        }
        if pending_segment {
            count += 1;
            pending_segment = false;
        }
    }
    count
}

pub fn has_segments(text: &str) -> bool {
    segment_count(text) > 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterVariant {
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub uri: String,
}

/// Variants of a master playlist in source order.
pub fn parse_master_variants(text: &str) -> Vec<MasterVariant> {
    let mut out = Vec::new();
    let mut pending: Option<(u64, Option<(u32, u32)>)> = None;
    for raw in text.lines() {
        let line = raw.trim();
        if let Some(attrs) = line
            .strip_prefix(STREAM_INF_TAG)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            let mut bw: u64 = 0;
            let mut res: Option<(u32, u32)> = None;
            for (key, value) in split_attributes(attrs) {
                match key {
                    "BANDWIDTH" => bw = value.parse().unwrap_or(0),
                    "RESOLUTION" => {
                        res = value.split_once('x').and_then(|(w, h)| {
                            Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?))
                        });
                    }
                    _ => {}
                }
            }
            pending = Some((bw, res));
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((bandwidth, resolution)) = pending.take() {
            out.push(MasterVariant {
                bandwidth,
                resolution,
                uri: line.to_string(),
            });
        }
    }
    out
}

/// Split an HLS attribute list on commas outside quoted strings.
fn split_attributes(attrs: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0usize;
    let bytes = attrs.as_bytes();
    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        if !at_end && bytes[i] == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if at_end || (bytes[i] == b',' && !in_quotes) {
            let part = attrs[start..i].trim();
            if let Some((k, v)) = part.split_once('=') {
                out.push((k.trim(), v.trim().trim_matches('"')));
            }
            start = i + 1;
        }
    }
    out
}

/// Replace the value of a `URI="..."` attribute with its absolute form.
fn rewrite_uri_attribute(line: &str, base_url: &str) -> String {
    const NEEDLE: &str = "URI=\"";
    let Some(start) = line.find(NEEDLE).map(|p| p + NEEDLE.len()) else {
        return line.to_string();
    };
    let Some(len) = line[start..].find('"') else {
        return line.to_string();
    };
    let uri = &line[start..start + len];
    format!(
        "{}{}{}",
        &line[..start],
        UrlUtils::absolutize(base_url, uri),
        &line[start + len..]
    )
}

/// Remove ad-marker tags and make every URI absolute against `base_url`.
///
/// Tag lines other than ad markers are kept verbatim (apart from URI
/// attributes on key/map tags), bare lines are treated as segment references,
/// blank lines are dropped and the output always starts with `#EXTM3U`.
pub fn filter_and_normalize_media_playlist(text: &str, base_url: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if is_ad_marker(line) {
                continue;
            }
            if URI_ATTRIBUTE_TAGS.contains(&tag_name(line)) {
                out.push(rewrite_uri_attribute(line, base_url));
            } else {
                out.push(line.to_string());
            }
            continue;
        }
        out.push(UrlUtils::absolutize(base_url, line));
    }

    if !out
        .first()
        .is_some_and(|first| tag_name(first) == PLAYLIST_HEADER)
    {
        out.insert(0, PLAYLIST_HEADER.to_string());
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "https://cdn.example.com/vod/ep1/index.m3u8";

    const AD_PLAYLIST: &str = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXT-X-DISCONTINUITY-SEQUENCE:2
#EXT-X-KEY:METHOD=AES-128,URI="keys/k1.key",IV=0x1
#EXTINF:6.0,
seg100.ts
#EXT-X-DISCONTINUITY
#EXT-X-CUE-OUT:DURATION=30
#EXTINF:6.0,
https://ads.example.net/ad1.ts
#EXT-X-CUE-OUT-CONT:ElapsedTime=6,Duration=30
#EXT-X-CUE-IN
#EXT-X-DISCONTINUITY
#EXTINF:6.0,
/abs/seg101.ts
#EXT-X-ENDLIST
"#;

    #[test]
    fn removes_ad_markers_and_absolutizes_uris() {
        let out = filter_and_normalize_media_playlist(AD_PLAYLIST, BASE);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#EXT-X-VERSION:3",
                "#EXT-X-TARGETDURATION:6",
                "#EXT-X-MEDIA-SEQUENCE:100",
                "#EXT-X-DISCONTINUITY-SEQUENCE:2",
                "#EXT-X-KEY:METHOD=AES-128,URI=\"https://cdn.example.com/vod/ep1/keys/k1.key\",IV=0x1",
                "#EXTINF:6.0,",
                "https://cdn.example.com/vod/ep1/seg100.ts",
                "#EXTINF:6.0,",
                "https://ads.example.net/ad1.ts",
                "#EXTINF:6.0,",
                "https://cdn.example.com/abs/seg101.ts",
                "#EXT-X-ENDLIST",
            ]
        );
    }

    #[test]
    fn prepends_header_when_missing() {
        let out = filter_and_normalize_media_playlist("#EXTINF:4,\na.ts\n", BASE);
        assert!(out.starts_with("#EXTM3U\n"));
        assert_eq!(segment_count(&out), 1);
    }

    #[test]
    fn rewrites_map_uri() {
        let out = filter_and_normalize_media_playlist(
            "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:4,\na.m4s\n",
            BASE,
        );
        assert!(out.contains("#EXT-X-MAP:URI=\"https://cdn.example.com/vod/ep1/init.mp4\""));
    }

    #[test]
    fn detects_master_playlists_and_segments() {
        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n";
        assert!(is_master_playlist(master));
        assert!(!has_segments(master));
        assert!(!is_master_playlist(AD_PLAYLIST));
        assert_eq!(segment_count(AD_PLAYLIST), 3);
    }

    #[test]
    fn master_variant_parse_keeps_source_order_and_quoted_codecs() {
        let playlist = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,CODECS="avc1.4d401e,mp4a.40.2",RESOLUTION=640x360
low/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4000000,RESOLUTION=1920x1080
hi/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1600000
mid/playlist.m3u8
"#;
        let variants = parse_master_variants(playlist);
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].bandwidth, 800000);
        assert_eq!(variants[0].resolution, Some((640, 360)));
        assert_eq!(variants[1].bandwidth, 4000000);
        assert_eq!(variants[2].resolution, None);
        assert_eq!(variants[2].uri, "mid/playlist.m3u8");
    }

    fn playlist_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("#EXT-X-DISCONTINUITY".to_string()),
            Just("#EXT-X-CUE-OUT:DURATION=15".to_string()),
            Just("#EXT-X-CUE-OUT-CONT:10/15".to_string()),
            Just("#EXT-X-CUE-IN".to_string()),
            Just("#EXT-X-SCTE35:CUE=\"/DAAAA\"".to_string()),
            Just("#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00Z".to_string()),
            Just("#EXTINF:6.0,".to_string()),
            "[a-z]{1,8}\\.ts",
            "https://cdn\\.example\\.com/[a-z]{1,8}\\.ts",
        ]
    }

    proptest! {
        #[test]
        fn output_has_no_ad_markers_and_keeps_other_lines_in_order(
            lines in proptest::collection::vec(playlist_line(), 0..40)
        ) {
            let mut text = String::from("#EXTM3U\n");
            for l in &lines {
                text.push_str(l);
                text.push('\n');
            }
            let out = filter_and_normalize_media_playlist(&text, BASE);
            let out_lines: Vec<&str> = out.lines().collect();

            prop_assert!(out_lines.iter().all(|l| !is_ad_marker(l)));

            let expected: Vec<String> = lines
                .iter()
                .filter(|l| !is_ad_marker(l))
                .map(|l| if l.starts_with('#') { l.clone() } else { UrlUtils::absolutize(BASE, l) })
                .collect();
            let kept: Vec<String> = out_lines[1..].iter().map(|l| l.to_string()).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn filtering_is_idempotent(
            lines in proptest::collection::vec(playlist_line(), 0..40)
        ) {
            let text = lines.join("\n");
            let once = filter_and_normalize_media_playlist(&text, BASE);
            let twice = filter_and_normalize_media_playlist(&once, BASE);
            prop_assert_eq!(once, twice);
        }
    }
}
