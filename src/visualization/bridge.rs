//! Lossy single-slot channels between the mapping loop and a renderer.
//!
//! Every channel holds at most one value. Publishing never blocks: an unread
//! value is replaced by the new one, and a reader that finds nothing new keeps
//! what it already holds.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::map::MapStore;
use crate::plane::{Plane, PlaneFit};
use crate::types::isometry_to_rows;

/// What happened to a published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The slot was empty.
    Enqueued,
    /// An unread older value was discarded to make room.
    Replaced,
}

/// Producer half of a latest-value channel.
///
/// It keeps a receiver of its own so that it can evict the unread value.
pub struct LatestSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

/// Consumer half of a latest-value channel.
pub struct LatestReceiver<T> {
    rx: Receiver<T>,
    held: Option<T>,
    disconnected: bool,
}

pub fn latest_channel<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        LatestSender {
            tx,
            evict: rx.clone(),
        },
        LatestReceiver {
            rx,
            held: None,
            disconnected: false,
        },
    )
}

impl<T> LatestSender<T> {
    pub fn publish(&self, value: T) -> SendOutcome {
        let mut value = value;
        let mut outcome = SendOutcome::Enqueued;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return outcome,
                Err(TrySendError::Full(v)) => {
                    // The reader may take the old value first; either way the slot frees up.
                    if self.evict.try_recv().is_ok() {
                        outcome = SendOutcome::Replaced;
                    }
                    value = v;
                }
                // Unreachable while `evict` is alive.
                Err(TrySendError::Disconnected(_)) => return outcome,
            }
        }
    }
}

impl<T> LatestReceiver<T> {
    /// Takes the newest published value if there is one and returns the held value.
    pub fn latest(&mut self) -> Option<&T> {
        self.poll();
        self.held.as_ref()
    }

    /// Like [`LatestReceiver::latest`] but reports whether the value changed.
    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        loop {
            match self.rx.try_recv() {
                Ok(v) => {
                    self.held = Some(v);
                    updated = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        updated
    }

    pub fn held(&self) -> Option<&T> {
        self.held.as_ref()
    }

    /// True once the producer is gone and the slot is drained.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// Copy of the map published to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Publish counter, strictly increasing per bridge.
    pub sequence: u64,
    /// World-to-camera poses as row-major 4x4 matrices.
    pub poses: Vec<[[f64; 4]; 4]>,
    /// Camera centres in world coordinates.
    pub centers: Vec<[f64; 3]>,
    pub points: Vec<[f64; 3]>,
    /// Indices into `points`.
    pub inliers: Vec<usize>,
    pub plane: Option<Plane>,
}

impl MapSnapshot {
    pub fn capture(sequence: u64, store: &MapStore, fit: &PlaneFit) -> MapSnapshot {
        MapSnapshot {
            sequence,
            poses: store
                .frames()
                .iter()
                .map(|f| isometry_to_rows(f.pose()))
                .collect(),
            centers: store
                .frames()
                .iter()
                .map(|f| {
                    let c = f.center();
                    [c.x, c.y, c.z]
                })
                .collect(),
            points: store
                .points()
                .iter()
                .map(|p| {
                    let l = p.location();
                    [l.x, l.y, l.z]
                })
                .collect(),
            inliers: fit.inliers.clone(),
            plane: fit.plane,
        }
    }
}

/// Annotated frame tagged with the sequence of the snapshot it belongs to.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub sequence: u64,
    pub image: RgbImage,
}

/// Receiving halves handed to the renderer.
pub struct ViewerChannels {
    pub snapshots: LatestReceiver<MapSnapshot>,
    pub images: LatestReceiver<FrameImage>,
}

/// Geometry and image channels of the mapping loop.
pub struct VisualizationBridge {
    snapshots: LatestSender<MapSnapshot>,
    images: LatestSender<FrameImage>,
    sequence: u64,
}

impl VisualizationBridge {
    pub fn new() -> (VisualizationBridge, ViewerChannels) {
        let (snapshot_tx, snapshot_rx) = latest_channel();
        let (image_tx, image_rx) = latest_channel();
        (
            VisualizationBridge {
                snapshots: snapshot_tx,
                images: image_tx,
                sequence: 0,
            },
            ViewerChannels {
                snapshots: snapshot_rx,
                images: image_rx,
            },
        )
    }

    /// Captures and publishes the current map. Returns the snapshot's sequence number.
    pub fn publish_map(&mut self, store: &MapStore, fit: &PlaneFit) -> u64 {
        self.sequence += 1;
        let snapshot = MapSnapshot::capture(self.sequence, store, fit);
        self.publish_snapshot(snapshot);
        self.sequence
    }

    pub fn publish_snapshot(&self, snapshot: MapSnapshot) -> SendOutcome {
        self.snapshots.publish(snapshot)
    }

    /// Publishes an image under the sequence of the last published map.
    pub fn publish_image(&self, image: RgbImage) -> SendOutcome {
        self.images.publish(FrameImage {
            sequence: self.sequence,
            image,
        })
    }

    /// Sequence number of the last snapshot published with [`VisualizationBridge::publish_map`].
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
