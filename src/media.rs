//! Links athlete media feedback to the exact set it was recorded for.
//!
//! A record matches a set when the exercise names agree after
//! normalization (or one contains the other) and its serie key, or the
//! legacy set number when no key exists, points at the same set.

use crate::model::MediaFeedback;
use crate::normalize::Normalizer;

/// Decoded `serieKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SerieKey {
    /// `week|dayIndex|exerciseIndex|setIndex0` or longer.
    Positional {
        week: Option<u32>,
        set_index0: Option<u32>,
    },
    /// Fewer than four parts; only the trailing set index is meaningful.
    Legacy { set_index0: Option<u32> },
}

impl SerieKey {
    fn parse(key: &str) -> Self {
        let parts: Vec<&str> = key.split('|').map(str::trim).collect();
        let set_index0 = parts.last().and_then(|p| p.parse::<u32>().ok());
        if parts.len() >= 4 {
            SerieKey::Positional {
                week: parts[0].parse::<u32>().ok(),
                set_index0,
            }
        } else {
            SerieKey::Legacy { set_index0 }
        }
    }

    fn points_at(self, set_number: u32, week: u32) -> bool {
        match self {
            SerieKey::Positional {
                week: Some(w),
                set_index0: Some(idx),
            } => w == week && idx.checked_add(1) == Some(set_number),
            // Legacy keys predate the week prefix, so any week matches.
            SerieKey::Legacy {
                set_index0: Some(idx),
            } => idx.checked_add(1) == Some(set_number),
            _ => false,
        }
    }
}

/// Feedback matched to one set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetMediaLinks<'a> {
    /// Every match, newest first.
    pub all: Vec<&'a MediaFeedback>,
    /// Newest audio match.
    pub audio: Option<&'a MediaFeedback>,
    /// Newest video or photo match.
    pub visual: Option<&'a MediaFeedback>,
}

impl SetMediaLinks<'_> {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Feedback records with their exercise names normalized once.
#[derive(Debug, Clone)]
pub struct FeedbackIndex<'a> {
    normalizer: Normalizer,
    entries: Vec<(String, &'a MediaFeedback)>,
}

impl<'a> FeedbackIndex<'a> {
    pub fn with_normalizer(feedback: &'a [MediaFeedback], normalizer: Normalizer) -> Self {
        let entries = feedback
            .iter()
            .map(|fb| (normalizer.normalize(&fb.exercise_name), fb))
            .collect();
        FeedbackIndex {
            normalizer,
            entries,
        }
    }

    /// Feedback recorded for `set_number` of `exercise_name` in programme
    /// `week`, newest first.
    pub fn find_matches(
        &self,
        exercise_name: &str,
        set_number: u32,
        week: u32,
    ) -> Vec<&'a MediaFeedback> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let target = self.normalizer.normalize(exercise_name);
        let mut found: Vec<&'a MediaFeedback> = self
            .entries
            .iter()
            .filter(|(name, _)| names_match(name, &target))
            .filter(|(_, fb)| match fb.serie_key.as_deref() {
                Some(key) => SerieKey::parse(key).points_at(set_number, week),
                None => fb.set_number == Some(set_number),
            })
            .map(|(_, fb)| *fb)
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// All matches plus the newest audio and newest visual one.
    pub fn links(&self, exercise_name: &str, set_number: u32, week: u32) -> SetMediaLinks<'a> {
        let all = self.find_matches(exercise_name, set_number, week);
        let audio = all.iter().copied().find(|fb| fb.media_type.is_audio());
        let visual = all.iter().copied().find(|fb| fb.media_type.is_visual());
        SetMediaLinks { all, audio, visual }
    }
}

/// Normalized names match when equal or when one contains the other.
///
/// A name that normalizes to nothing is contained in every name, so such a
/// record is matched on its key alone.
fn names_match(a: &str, b: &str) -> bool {
    a == b || a.contains(b) || b.contains(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaType, RawMediaFeedback};
    use chrono::{TimeZone, Utc};

    fn find_matches<'a>(
        exercise_name: &str,
        set_number: u32,
        week: u32,
        feedback: &'a [MediaFeedback],
    ) -> Vec<&'a MediaFeedback> {
        FeedbackIndex::with_normalizer(feedback, Normalizer::default()).find_matches(exercise_name, set_number, week)
    }

    fn feedback(
        id: &str,
        name: &str,
        media: &str,
        serie_key: Option<&str>,
        set_number: Option<u32>,
        day: u32,
    ) -> MediaFeedback {
        MediaFeedback::from(RawMediaFeedback {
            id: Some(id.into()),
            exercise_name: Some(name.into()),
            media_type: Some(media.into()),
            serie_key: serie_key.map(Into::into),
            set_number,
            created_at: Some(Utc.with_ymd_and_hms(2024, 4, day, 8, 0, 0).unwrap()),
            ..RawMediaFeedback::default()
        })
    }

    fn ids(found: &[&MediaFeedback]) -> Vec<String> {
        found.iter().map(|f| f.id.clone()).collect()
    }

    #[test]
    fn positional_key_requires_week_and_set() {
        let all = vec![
            feedback("a", "Press de Banca", "video", Some("3|0|1|1"), None, 1),
            feedback("b", "Press de Banca", "video", Some("4|0|1|1"), None, 2),
            feedback("c", "Press de Banca", "video", Some("3|0|1|0"), None, 3),
        ];
        assert_eq!(ids(&find_matches("press banca", 2, 3, &all)), vec!["a"]);
    }

    #[test]
    fn legacy_key_ignores_week() {
        let all = vec![feedback("a", "Sentadilla", "audio", Some("sentadilla|2"), None, 1)];
        assert_eq!(ids(&find_matches("Sentadilla", 3, 7, &all)), vec!["a"]);
        assert_eq!(ids(&find_matches("Sentadilla", 3, 1, &all)), vec!["a"]);
        assert!(find_matches("Sentadilla", 2, 7, &all).is_empty());
    }

    #[test]
    fn missing_key_falls_back_to_set_number() {
        let all = vec![
            feedback("a", "Remo con barra", "photo", None, Some(2), 1),
            feedback("b", "Remo con barra", "photo", None, None, 2),
        ];
        assert_eq!(ids(&find_matches("Remo con barra", 2, 9, &all)), vec!["a"]);
    }

    #[test]
    fn partial_names_match_both_ways() {
        let all = vec![
            feedback("a", "Curl", "video", None, Some(1), 1),
            feedback("b", "Curl martillo con mancuernas", "video", None, Some(1), 2),
            feedback("c", "Jalón al pecho", "video", None, Some(1), 3),
        ];
        assert_eq!(ids(&find_matches("Curl martillo", 1, 1, &all)), vec!["b", "a"]);
    }

    #[test]
    fn empty_names_match_on_key_alone() {
        let all = vec![
            feedback("a", "", "video", Some("1|0|0|0"), None, 1),
            feedback("b", "de la", "audio", None, Some(1), 2),
            feedback("c", "", "video", Some("1|0|0|1"), None, 3),
        ];
        assert_eq!(ids(&find_matches("Sentadilla", 1, 1, &all)), vec!["b", "a"]);
        assert_eq!(ids(&find_matches("", 2, 1, &all)), vec!["c"]);
    }

    #[test]
    fn huge_set_index_does_not_overflow() {
        let all = vec![
            feedback("a", "Sentadilla", "video", Some("1|0|0|4294967295"), None, 1),
            feedback("b", "Sentadilla", "video", Some("4294967295"), None, 2),
        ];
        assert!(find_matches("Sentadilla", 1, 1, &all).is_empty());
        assert!(find_matches("Sentadilla", u32::MAX, 1, &all).is_empty());
    }

    #[test]
    fn two_part_legacy_key_reads_last_part() {
        let all = vec![feedback("a", "Sentadilla", "video", Some("2|0"), None, 1)];
        assert_eq!(ids(&find_matches("Sentadilla", 1, 7, &all)), vec!["a"]);
        assert_eq!(ids(&find_matches("Sentadilla", 1, 2, &all)), vec!["a"]);
        assert!(find_matches("Sentadilla", 3, 7, &all).is_empty());
    }

    #[test]
    fn malformed_key_does_not_match() {
        let all = vec![
            feedback("a", "Sentadilla", "video", Some("x|0|0|y"), None, 1),
            feedback("b", "Sentadilla", "video", Some("|"), None, 2),
        ];
        assert!(find_matches("Sentadilla", 1, 1, &all).is_empty());
    }

    #[test]
    fn newest_first_and_deterministic() {
        let all = vec![
            feedback("old", "Sentadilla", "video", Some("1|0|0|0"), None, 1),
            feedback("new", "Sentadilla", "audio", Some("1|0|0|0"), None, 5),
            feedback("mid", "Sentadilla", "photo", Some("1|0|0|0"), None, 3),
        ];
        let first = ids(&find_matches("Sentadilla", 1, 1, &all));
        assert_eq!(first, vec!["new", "mid", "old"]);
        assert_eq!(ids(&find_matches("Sentadilla", 1, 1, &all)), first);
    }

    #[test]
    fn audio_and_visual_links_coexist() {
        let all = vec![
            feedback("v", "Sentadilla", "video", Some("1|0|0|0"), None, 1),
            feedback("a", "Sentadilla", "audio", Some("1|0|0|0"), None, 2),
            feedback("p", "Sentadilla", "photo", Some("1|0|0|0"), None, 3),
        ];
        let index = FeedbackIndex::with_normalizer(&all, Normalizer::default());
        let links = index.links("Sentadilla", 1, 1);
        assert_eq!(links.all.len(), 3);
        assert_eq!(links.audio.map(|f| f.id.as_str()), Some("a"));
        assert_eq!(links.visual.map(|f| f.id.as_str()), Some("p"));
        assert_eq!(links.visual.map(|f| f.media_type), Some(MediaType::Photo));
        assert!(index.links("Sentadilla", 2, 1).is_empty());
    }
}
