//! Transform buffer: a time-stamped graph of named reference frames.
//!
//! Edges carry the pose of a child frame relative to its parent, either as a
//! static transform or as a short history of stamped samples.  Lookups walk
//! the graph breadth first in either direction (reverse edges use the
//! inverse transform) and interpolate each edge at the requested stamp.
//!
//! [`TfBuffer`] implements [`TransformSource`], the narrow interface the
//! self filter resolves body and sensor poses through.  Its lookups block
//! for at most the supplied timeout while waiting for data to arrive.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use selfmask_geometry::tf_buffer::{TfBuffer, TransformSource};
//! use selfmask_geometry::transform::{Transform3D, Vec3};
//!
//! let tf = TfBuffer::new();
//! tf.set_static_transform("base_link", "torso", Transform3D::from_translation(Vec3::new(0.0, 0.0, 0.5)));
//! tf.set_static_transform("torso", "head", Transform3D::from_translation(Vec3::new(0.1, 0.0, 0.3)));
//!
//! let t = tf
//!     .lookup_transform("base_link", "head", Utc::now(), Duration::from_millis(10))
//!     .unwrap();
//! assert!((t.translation.z - 0.8).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use selfmask_types::LookupError;

use crate::transform::Transform3D;

/// Source of rigid transforms between named frames.
pub trait TransformSource {
    /// Return T_target_source (maps points in `source_frame` into
    /// `target_frame`) at `stamp`, waiting at most `timeout` for the data.
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, LookupError>;
}

impl<T: TransformSource + ?Sized> TransformSource for &T {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, LookupError> {
        (**self).lookup_transform(target_frame, source_frame, stamp, timeout)
    }
}

impl<T: TransformSource + ?Sized> TransformSource for Arc<T> {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, LookupError> {
        (**self).lookup_transform(target_frame, source_frame, stamp, timeout)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Edge history
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct EdgeHistory {
    is_static: bool,
    /// Sorted by stamp, oldest first.  Exactly one entry for static edges.
    samples: VecDeque<(DateTime<Utc>, Transform3D)>,
}

impl EdgeHistory {
    fn insert(&mut self, stamp: DateTime<Utc>, transform: Transform3D, cache: chrono::Duration) {
        let idx = self.samples.partition_point(|(s, _)| *s < stamp);
        match self.samples.get_mut(idx) {
            Some(existing) if existing.0 == stamp => existing.1 = transform,
            _ => self.samples.insert(idx, (stamp, transform)),
        }
        if let Some(&(newest, _)) = self.samples.back() {
            while self
                .samples
                .front()
                .is_some_and(|(s, _)| newest - *s > cache)
            {
                self.samples.pop_front();
            }
        }
    }

    fn sample_at(
        &self,
        parent: &str,
        child: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, LookupError> {
        let (Some(&(oldest, first)), Some(&(latest, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return Err(LookupError::NoPath {
                source_frame: child.to_string(),
                target_frame: parent.to_string(),
            });
        };
        if self.is_static {
            return Ok(last);
        }
        if stamp > latest {
            return Err(LookupError::NotYetAvailable {
                parent: parent.to_string(),
                child: child.to_string(),
                requested: stamp,
                latest,
            });
        }
        if stamp < oldest {
            return Err(LookupError::ExtrapolationPast {
                parent: parent.to_string(),
                child: child.to_string(),
                requested: stamp,
                oldest,
            });
        }
        if stamp == oldest {
            return Ok(first);
        }

        // First sample strictly after `stamp`; it exists because stamp <= latest
        // and the exact-latest case lands on the previous sample.
        let after = self.samples.partition_point(|(s, _)| *s <= stamp);
        let (t0, before_tf) = self.samples[after - 1];
        if t0 == stamp || after == self.samples.len() {
            return Ok(before_tf);
        }
        let (t1, after_tf) = self.samples[after];
        let span = (t1 - t0).num_nanoseconds().unwrap_or(i64::MAX) as f64;
        let offset = (stamp - t0).num_nanoseconds().unwrap_or(0) as f64;
        Ok(before_tf.interpolate(after_tf, offset / span))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame graph
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct FrameGraph {
    /// `edges[(parent, child)]`
    edges: HashMap<(String, String), EdgeHistory>,
    /// `adjacency[frame] = [(neighbour, frame_is_parent)]`
    adjacency: HashMap<String, Vec<(String, bool)>>,
    cache: chrono::Duration,
}

impl FrameGraph {
    fn edge_mut(&mut self, parent: &str, child: &str, is_static: bool) -> &mut EdgeHistory {
        let key = (parent.to_string(), child.to_string());
        if !self.edges.contains_key(&key) {
            self.adjacency
                .entry(parent.to_string())
                .or_default()
                .push((child.to_string(), true));
            self.adjacency
                .entry(child.to_string())
                .or_default()
                .push((parent.to_string(), false));
        }
        let edge = self.edges.entry(key).or_insert_with(|| EdgeHistory {
            is_static,
            samples: VecDeque::new(),
        });
        if edge.is_static != is_static {
            edge.is_static = is_static;
            edge.samples.clear();
        }
        edge
    }

    /// Breadth-first search for the frame chain `target → … → source`.
    fn path(&self, target_frame: &str, source_frame: &str) -> Option<Vec<(String, String, bool)>> {
        let mut came_from: HashMap<&str, (&str, bool)> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        visited.insert(target_frame);
        queue.push_back(target_frame);

        while let Some(current) = queue.pop_front() {
            if current == source_frame {
                let mut hops = Vec::new();
                let mut node = current;
                while let Some(&(prev, forward)) = came_from.get(node) {
                    hops.push((prev.to_string(), node.to_string(), forward));
                    node = prev;
                }
                hops.reverse();
                return Some(hops);
            }
            for (next, forward) in self.adjacency.get(current).into_iter().flatten() {
                if visited.insert(next.as_str()) {
                    came_from.insert(next.as_str(), (current, *forward));
                    queue.push_back(next.as_str());
                }
            }
        }
        None
    }

    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, LookupError> {
        if target_frame == source_frame {
            return Ok(Transform3D::identity());
        }
        for frame in [target_frame, source_frame] {
            if !self.adjacency.contains_key(frame) {
                return Err(LookupError::UnknownFrame(frame.to_string()));
            }
        }
        let hops = self
            .path(target_frame, source_frame)
            .ok_or_else(|| LookupError::NoPath {
                source_frame: source_frame.to_string(),
                target_frame: target_frame.to_string(),
            })?;

        let mut accumulated = Transform3D::identity();
        for (from, to, forward) in hops {
            let step = if forward {
                self.sample(&from, &to, stamp)?
            } else {
                self.sample(&to, &from, stamp)?.inverse()
            };
            accumulated = accumulated.compose(step);
        }
        Ok(accumulated)
    }

    fn sample(&self, parent: &str, child: &str, stamp: DateTime<Utc>) -> Result<Transform3D, LookupError> {
        match self.edges.get(&(parent.to_string(), child.to_string())) {
            Some(edge) => edge.sample_at(parent, child, stamp),
            None => Err(LookupError::NoPath {
                source_frame: child.to_string(),
                target_frame: parent.to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe transform buffer.  Writers publish transforms through `&self`
/// so a buffer can be shared (e.g. via `Arc`) between a publishing thread
/// and the self filter.
#[derive(Debug)]
pub struct TfBuffer {
    graph: Mutex<FrameGraph>,
    updated: Condvar,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::with_cache_duration(Duration::from_secs(10))
    }
}

impl TfBuffer {
    /// Create an empty buffer keeping 10 s of history per edge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer keeping `cache` worth of history per edge.
    pub fn with_cache_duration(cache: Duration) -> Self {
        Self {
            graph: Mutex::new(FrameGraph {
                edges: HashMap::new(),
                adjacency: HashMap::new(),
                cache: chrono::Duration::from_std(cache).unwrap_or(chrono::Duration::MAX),
            }),
            updated: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the pose of `child_frame` in `parent_frame` at `stamp`.
    pub fn set_transform(
        &self,
        parent_frame: &str,
        child_frame: &str,
        stamp: DateTime<Utc>,
        transform: Transform3D,
    ) {
        let mut graph = self.lock();
        let cache = graph.cache;
        graph
            .edge_mut(parent_frame, child_frame, false)
            .insert(stamp, transform, cache);
        drop(graph);
        self.updated.notify_all();
    }

    /// Record a time-independent pose of `child_frame` in `parent_frame`.
    pub fn set_static_transform(&self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        let mut graph = self.lock();
        let edge = graph.edge_mut(parent_frame, child_frame, true);
        edge.samples.clear();
        edge.samples.push_back((DateTime::<Utc>::UNIX_EPOCH, transform));
        drop(graph);
        self.updated.notify_all();
    }

    /// Names of every frame known to the buffer, sorted.
    pub fn frames(&self) -> Vec<String> {
        let mut frames: Vec<String> = self.lock().adjacency.keys().cloned().collect();
        frames.sort();
        frames
    }

    /// Non-blocking check whether T_target_source is available at `stamp`.
    pub fn can_transform(&self, target_frame: &str, source_frame: &str, stamp: DateTime<Utc>) -> bool {
        self.lock().lookup(target_frame, source_frame, stamp).is_ok()
    }
}

impl TransformSource for TfBuffer {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Transform3D, LookupError> {
        let deadline = Instant::now() + timeout;
        let mut graph = self.lock();
        loop {
            match graph.lookup(target_frame, source_frame, stamp) {
                Ok(t) => return Ok(t),
                Err(e) if e.is_retryable() => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LookupError::Timeout {
                            source_frame: source_frame.to_string(),
                            target_frame: target_frame.to_string(),
                            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            reason: e.to_string(),
                        });
                    }
                    let (guard, _) = self
                        .updated
                        .wait_timeout(graph, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    graph = guard;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Quaternion, Vec3};
    use std::f64::consts::FRAC_PI_2;

    const NO_WAIT: Duration = Duration::ZERO;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn translation(x: f64, y: f64, z: f64) -> Transform3D {
        Transform3D::from_translation(Vec3::new(x, y, z))
    }

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfBuffer::new();
        let t = tf.lookup_transform("world", "world", t0(), NO_WAIT).unwrap();
        assert_eq!(t, Transform3D::identity());
    }

    #[test]
    fn lookup_composed_chain() {
        let tf = TfBuffer::new();
        tf.set_static_transform("world", "robot_base", translation(1.0, 0.0, 0.0));
        tf.set_static_transform("robot_base", "camera", translation(0.5, 0.0, 0.0));

        let t = tf.lookup_transform("world", "camera", t0(), NO_WAIT).unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_walks_edges_in_reverse() {
        let tf = TfBuffer::new();
        tf.set_static_transform("world", "robot_base", translation(1.0, 0.0, 0.0));
        tf.set_static_transform("world", "camera", translation(0.0, 2.0, 0.0));

        // camera → world → robot_base
        let t = tf.lookup_transform("camera", "robot_base", t0(), NO_WAIT).unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-9);
        assert!((t.translation.y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        let tf = TfBuffer::new();
        tf.set_static_transform(
            "world",
            "robot_base",
            Transform3D::new(Vec3::zero(), Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2)),
        );
        tf.set_static_transform("robot_base", "camera", translation(1.0, 0.0, 0.0));

        let t = tf.lookup_transform("world", "camera", t0(), NO_WAIT).unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn unknown_frame_times_out() {
        let tf = TfBuffer::new();
        tf.set_static_transform("world", "robot_base", translation(1.0, 0.0, 0.0));
        let err = tf
            .lookup_transform("world", "ghost_frame", t0(), Duration::from_millis(5))
            .unwrap_err();
        match err {
            LookupError::Timeout { reason, .. } => assert!(reason.contains("ghost_frame")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn disconnected_frames_report_no_path() {
        let tf = TfBuffer::new();
        tf.set_static_transform("world", "a", translation(1.0, 0.0, 0.0));
        tf.set_static_transform("other", "b", translation(1.0, 0.0, 0.0));
        assert!(!tf.can_transform("a", "b", t0()));
        assert_eq!(tf.frames(), vec!["a", "b", "other", "world"]);
    }

    #[test]
    fn stamped_edge_interpolates_between_samples() {
        let tf = TfBuffer::new();
        tf.set_transform("odom", "base_link", t0(), translation(0.0, 0.0, 0.0));
        tf.set_transform(
            "odom",
            "base_link",
            t0() + chrono::Duration::milliseconds(100),
            translation(1.0, 0.0, 0.0),
        );

        let mid = t0() + chrono::Duration::milliseconds(25);
        let t = tf.lookup_transform("odom", "base_link", mid, NO_WAIT).unwrap();
        assert!((t.translation.x - 0.25).abs() < 1e-9);

        let end = t0() + chrono::Duration::milliseconds(100);
        let t = tf.lookup_transform("odom", "base_link", end, NO_WAIT).unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn extrapolation_into_the_past_fails_without_waiting() {
        let tf = TfBuffer::new();
        tf.set_transform("odom", "base_link", t0(), translation(0.0, 0.0, 0.0));
        let before = t0() - chrono::Duration::seconds(1);
        let started = Instant::now();
        let err = tf
            .lookup_transform("odom", "base_link", before, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, LookupError::ExtrapolationPast { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn future_stamp_waits_for_data() {
        let tf = Arc::new(TfBuffer::new());
        tf.set_transform("odom", "base_link", t0(), translation(0.0, 0.0, 0.0));
        let later = t0() + chrono::Duration::milliseconds(50);

        let publisher = {
            let tf = Arc::clone(&tf);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                tf.set_transform("odom", "base_link", later, translation(2.0, 0.0, 0.0));
            })
        };

        let t = tf
            .lookup_transform("odom", "base_link", later, Duration::from_secs(5))
            .unwrap();
        assert!((t.translation.x - 2.0).abs() < 1e-9);
        publisher.join().unwrap();
    }

    #[test]
    fn old_samples_are_evicted_past_the_cache_window() {
        let tf = TfBuffer::with_cache_duration(Duration::from_secs(1));
        tf.set_transform("odom", "base_link", t0(), translation(0.0, 0.0, 0.0));
        tf.set_transform(
            "odom",
            "base_link",
            t0() + chrono::Duration::seconds(5),
            translation(1.0, 0.0, 0.0),
        );
        assert!(!tf.can_transform("odom", "base_link", t0()));
    }

    #[test]
    fn static_transform_valid_at_any_stamp() {
        let tf = TfBuffer::new();
        tf.set_static_transform("base_link", "laser", translation(0.2, 0.0, 0.3));
        let far_future = t0() + chrono::Duration::days(365);
        assert!(tf.can_transform("base_link", "laser", far_future));
        assert!(tf.can_transform("laser", "base_link", t0()));
    }
}
