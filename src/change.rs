//! 分组的变更检测。
//!
//! 新获取到的字段按逻辑分组与缓存比较：`{title, artist}`、`{cover}`、
//! `{position, duration}`、`{is_playing}`。组内任一字段不同即视为整组变化。

use crate::{
    api::{EventKind, MediaProperties, PlaybackInfo, TimelineProperties},
    state::Snapshot,
};

/// 一个字段分组的新值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// 标题与艺术家。
    Track {
        /// 新标题。
        title: String,
        /// 新艺术家。
        artist: String,
    },
    /// 封面；“有封面”与“无封面”之间的切换同样算作变化。
    Cover(Option<Vec<u8>>),
    /// 播放位置与总时长。
    Timeline {
        /// 新的播放位置。
        position: i64,
        /// 新的总时长。
        duration: i64,
    },
    /// 播放状态。
    Playback {
        /// 是否正在播放。
        is_playing: bool,
    },
}

impl ChangeSet {
    /// 该分组变化时应通知宿主的事件分类。
    pub fn event_kind(&self) -> EventKind {
        match self {
            ChangeSet::Track { .. } | ChangeSet::Cover(_) => EventKind::MediaPropertiesChanged,
            ChangeSet::Timeline { .. } => EventKind::TimelineChanged,
            ChangeSet::Playback { .. } => EventKind::PlaybackStatusChanged,
        }
    }

    /// 与缓存中的对应分组比较，任一字段不同即返回 `true`。
    pub fn differs_from(&self, snapshot: &Snapshot) -> bool {
        match self {
            ChangeSet::Track { title, artist } => {
                *title != snapshot.title || *artist != snapshot.artist
            }
            ChangeSet::Cover(cover) => *cover != snapshot.cover,
            ChangeSet::Timeline { position, duration } => {
                *position != snapshot.position || *duration != snapshot.duration
            }
            ChangeSet::Playback { is_playing } => *is_playing != snapshot.is_playing,
        }
    }

    /// 将该分组写入快照。
    pub fn apply_to(self, snapshot: &mut Snapshot) {
        match self {
            ChangeSet::Track { title, artist } => {
                snapshot.title = title;
                snapshot.artist = artist;
            }
            ChangeSet::Cover(cover) => snapshot.cover = cover,
            ChangeSet::Timeline { position, duration } => {
                snapshot.position = position;
                snapshot.duration = duration;
            }
            ChangeSet::Playback { is_playing } => snapshot.is_playing = is_playing,
        }
    }

    /// 把一次媒体属性获取拆成 `{title, artist}` 与 `{cover}` 两个分组。
    ///
    /// 超过 `max_cover_bytes` 的封面按“无封面”处理。
    pub fn from_media_properties(props: MediaProperties, max_cover_bytes: usize) -> [ChangeSet; 2] {
        let cover = props.cover.filter(|bytes| {
            if bytes.len() > max_cover_bytes {
                log::warn!(
                    "[变更检测] 封面数据 ({} 字节) 超出最大限制 ({max_cover_bytes} 字节)，已丢弃。",
                    bytes.len()
                );
                return false;
            }
            !bytes.is_empty()
        });
        [
            ChangeSet::Track {
                title: props.title,
                artist: props.artist,
            },
            ChangeSet::Cover(cover),
        ]
    }
}

impl From<TimelineProperties> for ChangeSet {
    fn from(timeline: TimelineProperties) -> Self {
        ChangeSet::Timeline {
            position: timeline.position,
            duration: timeline.end_time,
        }
    }
}

impl From<PlaybackInfo> for ChangeSet {
    fn from(info: PlaybackInfo) -> Self {
        ChangeSet::Playback {
            is_playing: info.is_playing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::PlaybackStatus, config::CoverReadPolicy, state::StateCache};

    fn populated_cache() -> StateCache {
        let cache = StateCache::new(CoverReadPolicy::Always);
        cache.apply([
            ChangeSet::Track {
                title: "Song".into(),
                artist: "Band".into(),
            },
            ChangeSet::Cover(Some(vec![1, 2, 3])),
            ChangeSet::Timeline {
                position: 100,
                duration: 1_000,
            },
            ChangeSet::Playback { is_playing: true },
        ]);
        cache.clear_dirty();
        cache
    }

    #[test]
    fn identical_values_produce_no_event() {
        let cache = populated_cache();
        let kinds = cache.apply([
            ChangeSet::Track {
                title: "Song".into(),
                artist: "Band".into(),
            },
            ChangeSet::Cover(Some(vec![1, 2, 3])),
            ChangeSet::Timeline {
                position: 100,
                duration: 1_000,
            },
            ChangeSet::Playback { is_playing: true },
        ]);
        assert!(kinds.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn title_change_only_touches_media_group() {
        let cache = populated_cache();
        let kinds = cache.apply([
            ChangeSet::Track {
                title: "Other Song".into(),
                artist: "Band".into(),
            },
            ChangeSet::Timeline {
                position: 100,
                duration: 1_000,
            },
            ChangeSet::Playback { is_playing: true },
        ]);
        assert_eq!(kinds, vec![EventKind::MediaPropertiesChanged]);
        assert!(cache.is_dirty());

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.title, "Other Song");
        assert_eq!(snapshot.artist, "Band");
        assert_eq!((snapshot.position, snapshot.duration), (100, 1_000));
        assert!(snapshot.is_playing);
    }

    #[test]
    fn losing_the_cover_is_a_change() {
        let cache = populated_cache();
        let kinds = cache.apply([ChangeSet::Cover(None)]);
        assert_eq!(kinds, vec![EventKind::MediaPropertiesChanged]);
        assert_eq!(cache.snapshot().cover, None);
    }

    #[test]
    fn media_groups_share_one_event() {
        let cache = populated_cache();
        let [track, cover] = ChangeSet::from_media_properties(
            MediaProperties {
                title: "New".into(),
                artist: "New".into(),
                cover: Some(vec![4, 5]),
            },
            1024,
        );
        assert_eq!(
            cache.apply([track, cover]),
            vec![EventKind::MediaPropertiesChanged]
        );
    }

    #[test]
    fn oversized_or_empty_cover_counts_as_missing() {
        let [_, cover] = ChangeSet::from_media_properties(
            MediaProperties {
                cover: Some(vec![0; 10]),
                ..Default::default()
            },
            4,
        );
        assert_eq!(cover, ChangeSet::Cover(None));

        let [_, cover] = ChangeSet::from_media_properties(
            MediaProperties {
                cover: Some(Vec::new()),
                ..Default::default()
            },
            4,
        );
        assert_eq!(cover, ChangeSet::Cover(None));
    }

    #[test]
    fn playback_info_maps_to_playing_flag() {
        let paused = ChangeSet::from(PlaybackInfo {
            status: PlaybackStatus::Paused,
        });
        assert_eq!(paused, ChangeSet::Playback { is_playing: false });
        assert_eq!(paused.event_kind(), EventKind::PlaybackStatusChanged);
    }
}
