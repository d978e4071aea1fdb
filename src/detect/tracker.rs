//! Frame-to-frame identity for detections.
//!
//! Greedy IoU association: every update pairs detections with live tracks in
//! order of decreasing overlap. Matched tracks keep their id, unmatched
//! detections open new tracks, and tracks that go unmatched for more than
//! `max_lost` updates are retired. Ids are never reused within a tracker.

use crate::detect::result::{Detection, Track};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MAX_LOST: u32 = 30;

struct LiveTrack {
    track: Track,
    lost: u32,
}

pub struct IouTracker {
    tracks: Vec<LiveTrack>,
    next_id: u32,
    iou_threshold: f32,
    max_lost: u32,
}

impl IouTracker {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_LOST)
    }

    pub fn with_params(iou_threshold: f32, max_lost: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            iou_threshold,
            max_lost,
        }
    }

    /// Associate this frame's detections and return the tracks visible in it,
    /// ordered by id.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<Track> {
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, live) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if live.track.class_id != det.class_id {
                    continue;
                }
                let iou = live.track.bbox.iou(&det.bbox);
                if iou >= self.iou_threshold {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_owner: Vec<Option<usize>> = vec![None; detections.len()];
        for (ti, di, _) in pairs {
            if track_taken[ti] || det_owner[di].is_some() {
                continue;
            }
            track_taken[ti] = true;
            det_owner[di] = Some(ti);
        }

        let mut visible = Vec::new();
        for (di, det) in detections.into_iter().enumerate() {
            match det_owner[di] {
                Some(ti) => {
                    let live = &mut self.tracks[ti];
                    live.lost = 0;
                    live.track.bbox = det.bbox;
                    live.track.confidence = det.confidence;
                    live.track.label = det.label;
                    live.track.hits += 1;
                    visible.push(live.track.clone());
                }
                None => {
                    let track = Track {
                        id: self.next_id,
                        bbox: det.bbox,
                        confidence: det.confidence,
                        class_id: det.class_id,
                        label: det.label,
                        hits: 1,
                    };
                    self.next_id += 1;
                    log::debug!("tracker: new track #{} ({})", track.id, track.label);
                    visible.push(track.clone());
                    self.tracks.push(LiveTrack { track, lost: 0 });
                    track_taken.push(true);
                }
            }
        }

        let max_lost = self.max_lost;
        let mut index = 0;
        self.tracks.retain_mut(|live| {
            let matched = track_taken[index];
            index += 1;
            if matched {
                return true;
            }
            live.lost += 1;
            if live.lost > max_lost {
                log::debug!("tracker: retired track #{}", live.track.id);
                false
            } else {
                true
            }
        });

        visible.sort_by_key(|t| t.id);
        visible
    }

    /// Tracks still held, including ones not seen in the last update.
    pub fn live_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn det(x: f32, y: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, y, 40.0, 20.0),
            confidence: 0.9,
            class_id: 0,
            label: "license plate".to_string(),
        }
    }

    #[test]
    fn moving_object_keeps_its_id() {
        let mut tracker = IouTracker::new();
        let first = tracker.update(vec![det(10.0, 10.0)]);
        let second = tracker.update(vec![det(14.0, 10.0)]);
        let third = tracker.update(vec![det(18.0, 11.0)]);
        assert_eq!(first[0].id, 1);
        assert_eq!(second[0].id, 1);
        assert_eq!(third[0].id, 1);
        assert_eq!(third[0].hits, 3);
    }

    #[test]
    fn separate_objects_get_separate_ids() {
        let mut tracker = IouTracker::new();
        let tracks = tracker.update(vec![det(0.0, 0.0), det(200.0, 200.0)]);
        let ids: Vec<u32> = tracks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);

        // Swap input order; association is by overlap, not position in the list.
        let tracks = tracker.update(vec![det(202.0, 200.0), det(2.0, 0.0)]);
        let ids: Vec<u32> = tracks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(tracks[1].bbox.x, 202.0);
    }

    #[test]
    fn lost_tracks_are_retired_and_ids_not_reused() {
        let mut tracker = IouTracker::with_params(0.3, 2);
        tracker.update(vec![det(10.0, 10.0)]);
        for _ in 0..3 {
            assert!(tracker.update(vec![]).is_empty());
        }
        assert_eq!(tracker.live_count(), 0);
        let tracks = tracker.update(vec![det(10.0, 10.0)]);
        assert_eq!(tracks[0].id, 2);
    }

    #[test]
    fn short_gap_keeps_identity() {
        let mut tracker = IouTracker::with_params(0.3, 2);
        tracker.update(vec![det(10.0, 10.0)]);
        tracker.update(vec![]);
        let tracks = tracker.update(vec![det(11.0, 10.0)]);
        assert_eq!(tracks[0].id, 1);
    }
}
