//! Bounded in-memory cache of rendered spectrograms.
//!
//! Keys cover everything that affects the output bytes: the recording
//! identity, the window bounds (bit-exact, with missing bounds resolved to
//! the recording's start and end) and both parameter sets.
//! Entries are evicted in insertion order once `capacity` is reached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::RecordingDescriptor;
use crate::error::{Error, Result};
use crate::params::{AudioParameters, SpectrogramParameters};
use crate::service::compute_spectrogram;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    recording: String,
    start: u64,
    end: u64,
    params: String,
}

impl CacheKey {
    fn new(
        recording: &RecordingDescriptor,
        start: Option<f64>,
        end: Option<f64>,
        audio_params: &AudioParameters,
        spec_params: &SpectrogramParameters,
    ) -> Result<Self> {
        let params = serde_json::to_string(&(audio_params, spec_params))
            .map_err(|e| Error::Internal(format!("cache key: {e}")))?;
        Ok(Self {
            recording: recording.cache_identity(),
            start: start.unwrap_or(0.0).to_bits(),
            end: end.unwrap_or(recording.duration).to_bits(),
            params,
        })
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, Arc<Vec<u8>>>,
    order: VecDeque<CacheKey>,
}

pub struct SpectrogramCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl SpectrogramCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Cached PNG for this request, computing and storing it on a miss.
    /// Failures are returned and never cached.
    pub fn get_or_compute(
        &self,
        recording: &RecordingDescriptor,
        start: Option<f64>,
        end: Option<f64>,
        audio_params: &AudioParameters,
        spec_params: &SpectrogramParameters,
    ) -> Result<Arc<Vec<u8>>> {
        let key = CacheKey::new(recording, start, end, audio_params, spec_params)?;
        if let Some(hit) = self.lock().map.get(&key) {
            log::debug!("Cache hit for {}", key.recording);
            return Ok(Arc::clone(hit));
        }

        // Computed outside the lock; concurrent misses on one key both compute.
        let png = Arc::new(compute_spectrogram(
            recording,
            start,
            end,
            audio_params,
            spec_params,
        )?);

        let mut entries = self.lock();
        if !entries.map.contains_key(&key) {
            while entries.order.len() >= self.capacity {
                if let Some(old) = entries.order.pop_front() {
                    entries.map.remove(&old);
                }
            }
            entries.order.push_back(key.clone());
            entries.map.insert(key, Arc::clone(&png));
        }
        Ok(png)
    }

    /// Drop every entry computed from `recording`.
    pub fn invalidate(&self, recording: &RecordingDescriptor) {
        let identity = recording.cache_identity();
        let mut entries = self.lock();
        entries.order.retain(|k| k.recording != identity);
        entries.map.retain(|k, _| k.recording != identity);
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
