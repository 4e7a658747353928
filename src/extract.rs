use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::reddit::{Post, RedditVideo};

static GIFV_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://i\.imgur\.com/[^.]+\.)gifv(/?)$").expect("valid gifv link regex")
});

static REDDIT_VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"redd\.it/([^/?#]+)").expect("valid reddit video id regex"));

const REDDIT_VIDEO_HOST: &str = "https://v.redd.it";
const REDDIT_AUDIO_TRACK: &str = "DASH_audio.mp4";

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub video_url: String,
    pub audio_url: Option<String>,
    pub post: Post,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("{field} is present but has no fallback_url")]
    MissingFallbackUrl { field: &'static str },
    #[error("{field}.fallback_url {url} does not name a reddit video id")]
    UnrecognizedVideoUrl { field: &'static str, url: String },
}

type RuleFn = fn(&Post) -> Option<Result<Playable, ExtractError>>;

struct Playable {
    video_url: String,
    audio_url: Option<String>,
}

struct Rule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: &[Rule] = &[
    Rule {
        name: "gifv link",
        apply: gifv_link,
    },
    Rule {
        name: "media.reddit_video",
        apply: media_video,
    },
    Rule {
        name: "secure_media.reddit_video",
        apply: secure_media_video,
    },
    Rule {
        name: "preview.reddit_video_preview",
        apply: preview_video,
    },
];

pub fn extract(post: &Post) -> Result<Option<MediaRef>, ExtractError> {
    for rule in RULES {
        if let Some(result) = (rule.apply)(post) {
            let playable = result?;
            debug!(rule = rule.name, url = %playable.video_url, "extracted media");
            return Ok(Some(MediaRef {
                video_url: playable.video_url,
                audio_url: playable.audio_url,
                post: post.clone(),
            }));
        }
    }
    Ok(None)
}

#[derive(Debug, Default)]
pub struct Extracted {
    pub items: Vec<MediaRef>,
    pub unplayable: usize,
    pub violations: usize,
}

pub fn extract_all<'a>(posts: impl IntoIterator<Item = &'a Post>) -> Extracted {
    let mut out = Extracted::default();
    for post in posts {
        match extract(post) {
            Ok(Some(media)) => out.items.push(media),
            Ok(None) => {
                out.unplayable += 1;
                debug!(
                    permalink = post.permalink.as_deref().unwrap_or(""),
                    "unhandled post"
                );
            }
            Err(err) => {
                out.violations += 1;
                warn!(
                    permalink = post.permalink.as_deref().unwrap_or(""),
                    error = %err,
                    "skipping post with unexpected video shape"
                );
            }
        }
    }
    out
}

fn gifv_link(post: &Post) -> Option<Result<Playable, ExtractError>> {
    let url = post.url.as_deref()?.trim();
    if !GIFV_LINK.is_match(url) {
        return None;
    }
    let video_url = GIFV_LINK.replace(url, "${1}mp4${2}").into_owned();
    Some(Ok(Playable {
        video_url,
        audio_url: None,
    }))
}

fn media_video(post: &Post) -> Option<Result<Playable, ExtractError>> {
    let video = post.media.as_ref()?.reddit_video.as_ref()?;
    Some(reddit_video(video, "media.reddit_video"))
}

fn secure_media_video(post: &Post) -> Option<Result<Playable, ExtractError>> {
    let video = post.secure_media.as_ref()?.reddit_video.as_ref()?;
    Some(reddit_video(video, "secure_media.reddit_video"))
}

fn preview_video(post: &Post) -> Option<Result<Playable, ExtractError>> {
    let video = post.preview.as_ref()?.reddit_video_preview.as_ref()?;
    Some(reddit_video(video, "preview.reddit_video_preview"))
}

fn reddit_video(video: &RedditVideo, field: &'static str) -> Result<Playable, ExtractError> {
    let video_url = video
        .fallback_url
        .as_deref()
        .map(sanitize_url)
        .filter(|url| !url.is_empty())
        .ok_or(ExtractError::MissingFallbackUrl { field })?;
    let audio_url = audio_url_for(&video_url).ok_or_else(|| ExtractError::UnrecognizedVideoUrl {
        field,
        url: video_url.clone(),
    })?;
    Ok(Playable {
        video_url,
        audio_url: Some(audio_url),
    })
}

// v.redd.it/<id>/DASH_720.mp4 -> v.redd.it/<id>/DASH_audio.mp4
pub fn audio_url_for(video_url: &str) -> Option<String> {
    let id = REDDIT_VIDEO_ID.captures(video_url)?.get(1)?.as_str();
    Some(format!("{}/{}/{}", REDDIT_VIDEO_HOST, id, REDDIT_AUDIO_TRACK))
}

fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::{PostMedia, Preview};

    const FALLBACK: &str = "https://v.redd.it/ABC123/DASH_720.mp4";

    fn video(url: &str) -> RedditVideo {
        RedditVideo {
            fallback_url: Some(url.to_string()),
        }
    }

    fn media(url: &str) -> Option<PostMedia> {
        Some(PostMedia {
            reddit_video: Some(video(url)),
        })
    }

    #[test]
    fn rewrites_gifv_links_to_mp4() {
        let post = Post {
            url: Some("https://i.imgur.com/AbCdEf.gifv".into()),
            ..Post::default()
        };
        let media = extract(&post).unwrap().unwrap();
        assert_eq!(media.video_url, "https://i.imgur.com/AbCdEf.mp4");
        assert_eq!(media.audio_url, None);

        let post = Post {
            url: Some("http://i.imgur.com/gifvish.gifv/".into()),
            ..Post::default()
        };
        let media = extract(&post).unwrap().unwrap();
        assert_eq!(media.video_url, "http://i.imgur.com/gifvish.mp4/");
    }

    #[test]
    fn ignores_links_that_are_not_gifv() {
        for url in [
            "https://i.imgur.com/AbCdEf.gif",
            "https://imgur.com/AbCdEf.gifv",
            "https://i.imgur.com/a.b.gifv",
            "https://example.com/clip.gifv",
        ] {
            let post = Post {
                url: Some(url.into()),
                ..Post::default()
            };
            assert!(extract(&post).unwrap().is_none(), "{url}");
        }
    }

    #[test]
    fn each_video_location_derives_audio() {
        let posts = [
            Post {
                media: media(FALLBACK),
                ..Post::default()
            },
            Post {
                secure_media: media(FALLBACK),
                ..Post::default()
            },
            Post {
                preview: Some(Preview {
                    reddit_video_preview: Some(video(FALLBACK)),
                }),
                ..Post::default()
            },
        ];
        for post in &posts {
            let media = extract(post).unwrap().unwrap();
            assert_eq!(media.video_url, FALLBACK);
            assert_eq!(
                media.audio_url.as_deref(),
                Some("https://v.redd.it/ABC123/DASH_audio.mp4")
            );
        }
    }

    #[test]
    fn earlier_location_wins() {
        let post = Post {
            url: Some("https://www.reddit.com/r/x/comments/1".into()),
            media: media("https://v.redd.it/first/DASH_480.mp4?source=fallback"),
            secure_media: media("https://v.redd.it/second/DASH_480.mp4"),
            ..Post::default()
        };
        let media = extract(&post).unwrap().unwrap();
        assert_eq!(
            media.video_url,
            "https://v.redd.it/first/DASH_480.mp4?source=fallback"
        );
        assert_eq!(
            media.audio_url.as_deref(),
            Some("https://v.redd.it/first/DASH_audio.mp4")
        );
    }

    #[test]
    fn gifv_link_beats_reddit_video() {
        let post = Post {
            url: Some("https://i.imgur.com/xyz.gifv".into()),
            media: media(FALLBACK),
            ..Post::default()
        };
        let media = extract(&post).unwrap().unwrap();
        assert_eq!(media.video_url, "https://i.imgur.com/xyz.mp4");
        assert!(media.audio_url.is_none());
    }

    #[test]
    fn nothing_playable() {
        let post = Post {
            url: Some("https://i.redd.it/picture.jpg".into()),
            media: Some(PostMedia { reddit_video: None }),
            preview: Some(Preview::default()),
            ..Post::default()
        };
        assert_eq!(extract(&post), Ok(None));
        assert_eq!(extract(&Post::default()), Ok(None));
    }

    #[test]
    fn video_shape_without_id_is_a_violation() {
        let post = Post {
            secure_media: media("https://cdn.example.com/clip.mp4"),
            ..Post::default()
        };
        assert_eq!(
            extract(&post),
            Err(ExtractError::UnrecognizedVideoUrl {
                field: "secure_media.reddit_video",
                url: "https://cdn.example.com/clip.mp4".into(),
            })
        );

        let post = Post {
            media: Some(PostMedia {
                reddit_video: Some(RedditVideo::default()),
            }),
            ..Post::default()
        };
        assert_eq!(
            extract(&post),
            Err(ExtractError::MissingFallbackUrl {
                field: "media.reddit_video"
            })
        );
    }

    #[test]
    fn decodes_html_entities() {
        let post = Post {
            media: media("https://v.redd.it/q1/DASH_360.mp4?a=1&amp;b=2"),
            ..Post::default()
        };
        let media = extract(&post).unwrap().unwrap();
        assert_eq!(media.video_url, "https://v.redd.it/q1/DASH_360.mp4?a=1&b=2");
    }

    #[test]
    fn page_extraction_keeps_order_and_counts_skips() {
        let posts = vec![
            Post {
                id: "1".into(),
                media: media("https://v.redd.it/one/DASH_720.mp4"),
                ..Post::default()
            },
            Post {
                id: "2".into(),
                ..Post::default()
            },
            Post {
                id: "3".into(),
                media: media("https://nowhere.test/x.mp4"),
                ..Post::default()
            },
            Post {
                id: "4".into(),
                url: Some("https://i.imgur.com/four.gifv".into()),
                ..Post::default()
            },
        ];
        let page = extract_all(&posts);
        let ids: Vec<_> = page.items.iter().map(|m| m.post.id.as_str()).collect();
        assert_eq!(ids, ["1", "4"]);
        assert_eq!(page.unplayable, 1);
        assert_eq!(page.violations, 1);
    }
}
