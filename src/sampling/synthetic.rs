use std::sync::{Mutex, MutexGuard};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use super::{
    detector::{count_matching, BoundingBox, Detection, DetectionResponse},
    CountSource, SamplingError,
};
use crate::models::Subject;

/// Class ids the simulated detector sprinkles in next to people.
const DISTRACTOR_CLASSES: [i64; 4] = [16, 17, 64, 66];
const MAX_SIMULATED_PEOPLE: u32 = 5;
const MAX_DISTRACTORS: u32 = 2;

fn lock(rng: &Mutex<StdRng>) -> MutexGuard<'_, StdRng> {
    match rng.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Uniform count in `[min, max]`.
pub struct SyntheticSource {
    min: u32,
    max: u32,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(min: u32, max: u32) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    pub fn seeded(min: u32, max: u32, seed: u64) -> Self {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: u32, max: u32, rng: StdRng) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            rng: Mutex::new(rng),
        }
    }

    pub fn draw(&self) -> u32 {
        lock(&self.rng).gen_range(self.min..=self.max)
    }
}

impl CountSource for SyntheticSource {
    async fn fetch(&self, _subject: &Subject) -> Result<u32, SamplingError> {
        Ok(self.draw())
    }
}

/// Fabricates detector payloads and counts them like live ones.
pub struct SimulatedDetectorSource {
    target_class: i64,
    rng: Mutex<StdRng>,
}

impl SimulatedDetectorSource {
    pub fn new(target_class: i64) -> Self {
        Self {
            target_class,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(target_class: i64, seed: u64) -> Self {
        Self {
            target_class,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn simulate(&self) -> DetectionResponse {
        let mut rng = lock(&self.rng);
        let people = rng.gen_range(0..=MAX_SIMULATED_PEOPLE);
        let distractors = rng.gen_range(0..=MAX_DISTRACTORS);

        let mut detections = Vec::with_capacity((people + distractors) as usize);
        for _ in 0..people {
            let confidence = rng.gen_range(0.4..0.9);
            detections.push(random_detection(&mut *rng, self.target_class, confidence));
        }
        for _ in 0..distractors {
            let class_id = DISTRACTOR_CLASSES
                .choose(&mut *rng)
                .copied()
                .unwrap_or(DISTRACTOR_CLASSES[0]);
            let confidence = rng.gen_range(0.3..0.7);
            detections.push(random_detection(&mut *rng, class_id, confidence));
        }

        DetectionResponse { detections }
    }
}

fn random_detection(rng: &mut StdRng, class_id: i64, confidence: f64) -> Detection {
    Detection {
        class_id: Some(class_id),
        confidence: Some((confidence * 1000.0).round() / 1000.0),
        bbox: Some(BoundingBox {
            left: rng.gen_range(0..=100),
            top: rng.gen_range(0..=100),
            right: rng.gen_range(100..=300),
            bottom: rng.gen_range(100..=300),
        }),
    }
}

impl CountSource for SimulatedDetectorSource {
    async fn fetch(&self, _subject: &Subject) -> Result<u32, SamplingError> {
        let response = self.simulate();
        Ok(count_matching(&response, self.target_class))
    }
}
