//! Scan session state machine.
//!
//! A session walks through the black reference, the white reference and then
//! one bit-plane per step, horizontal axis first, accumulating the decoded
//! coordinate bits into the projection map.

use super::classifier::{ClassifierKind, Response, ResponseClassifier, DEFAULT_MATCH_MARGIN};
use super::pattern::{ScanAxis, Stimulus};
use crate::bitmap::{
    pack_x, pack_y, unpack_x, unpack_y, PixelImage, COORDINATE_BITS, MAPPED_ALPHA, TRANSPARENT,
};
use crate::error::{Error, Result};
use image::{GrayImage, Rgba};

/// State of the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Waiting for a capture of the all-black stimulus.
    AwaitingBlack,
    /// Waiting for a capture of the all-white stimulus.
    AwaitingWhite,
    /// Waiting for a capture of one bit-plane.
    Scanning { axis: ScanAxis, bit: u32 },
    /// All bit-planes resolved.
    Done,
}

impl ScanState {
    pub fn is_done(&self) -> bool {
        matches!(self, ScanState::Done)
    }

    /// The stimulus that must be displayed in this state.
    pub fn stimulus(&self) -> Option<Stimulus> {
        match *self {
            ScanState::AwaitingBlack => Some(Stimulus::Black),
            ScanState::AwaitingWhite => Some(Stimulus::White),
            ScanState::Scanning { axis, bit } => Some(Stimulus::Mask { axis, bit }),
            ScanState::Done => None,
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stimulus() {
            Some(stimulus) => write!(f, "{}", stimulus),
            None => write!(f, "Complete"),
        }
    }
}

/// Drives a single structured light acquisition run.
pub struct ScanSession {
    /// log2 of the scan texture resolution.
    texture_size: u32,
    /// Number of bit-planes resolved per axis.
    scan_depth: u32,
    /// Lowest bit index scanned.
    min_scan_depth: u32,
    classifier_kind: ClassifierKind,
    match_margin: f32,
    classifier: Box<dyn ResponseClassifier>,
    state: ScanState,
    black_reference: Option<GrayImage>,
    white_reference: Option<GrayImage>,
    /// Alpha 255 = still mappable, 0 = permanently unmappable.
    projection_map: Option<PixelImage>,
}

impl ScanSession {
    /// Create a session with the default margin classifier.
    ///
    /// `texture_size` must be in `1..=12` and `scan_depth` in `1..=texture_size`.
    pub fn new(texture_size: u32, scan_depth: u32) -> Result<Self> {
        Self::with_classifier(texture_size, scan_depth, ClassifierKind::default(), DEFAULT_MATCH_MARGIN)
    }

    pub fn with_classifier(
        texture_size: u32,
        scan_depth: u32,
        classifier_kind: ClassifierKind,
        match_margin: f32,
    ) -> Result<Self> {
        if !(1..=COORDINATE_BITS).contains(&texture_size) {
            return Err(Error::Configuration(format!(
                "texture size {} must be between 1 and {}",
                texture_size, COORDINATE_BITS
            )));
        }
        if scan_depth == 0 || scan_depth > texture_size {
            return Err(Error::Configuration(format!(
                "scan depth {} must be between 1 and the texture size {}",
                scan_depth, texture_size
            )));
        }
        if !(0.0..=1.0).contains(&match_margin) {
            return Err(Error::Configuration(format!(
                "match margin {} must be between 0.0 and 1.0",
                match_margin
            )));
        }

        Ok(Self {
            texture_size,
            scan_depth,
            min_scan_depth: texture_size - scan_depth,
            classifier_kind,
            match_margin,
            classifier: classifier_kind.build(match_margin),
            state: ScanState::AwaitingBlack,
            black_reference: None,
            white_reference: None,
            projection_map: None,
        })
    }

    /// A fresh session with the same configuration and no captured data.
    pub fn restart(&self) -> ScanSession {
        ScanSession {
            texture_size: self.texture_size,
            scan_depth: self.scan_depth,
            min_scan_depth: self.min_scan_depth,
            classifier_kind: self.classifier_kind,
            match_margin: self.match_margin,
            classifier: self.classifier_kind.build(self.match_margin),
            state: ScanState::AwaitingBlack,
            black_reference: None,
            white_reference: None,
            projection_map: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn scan_depth(&self) -> u32 {
        self.scan_depth
    }

    pub fn min_scan_depth(&self) -> u32 {
        self.min_scan_depth
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier_kind
    }

    /// Side length of the stimulus textures.
    pub fn stimulus_size(&self) -> u32 {
        1 << self.texture_size
    }

    pub fn done(&self) -> bool {
        self.state.is_done()
    }

    /// Current stimulus description, `None` once done.
    pub fn current_stimulus_kind(&self) -> Option<Stimulus> {
        self.state.stimulus()
    }

    /// Render the stimulus the model must wear for the next capture.
    pub fn current_stimulus(&self) -> Option<PixelImage> {
        self.state
            .stimulus()
            .map(|stimulus| stimulus.render(self.stimulus_size()))
    }

    pub fn total_steps(&self) -> u32 {
        2 + 2 * (self.texture_size - self.min_scan_depth)
    }

    /// `(current_step, total_steps)`, 1-based. Once done this is `(total, total)`.
    pub fn progress(&self) -> (u32, u32) {
        let total = self.total_steps();
        let current = match self.state {
            ScanState::AwaitingBlack => 1,
            ScanState::AwaitingWhite => 2,
            ScanState::Scanning {
                axis: ScanAxis::Horizontal,
                bit,
            } => 2 + (self.texture_size - bit),
            ScanState::Scanning {
                axis: ScanAxis::Vertical,
                bit,
            } => 2 + self.scan_depth + (self.texture_size - bit),
            ScanState::Done => total,
        };
        (current, total)
    }

    /// Human readable step, e.g. `"Horizontal 8 (3 of 10)"`.
    pub fn step_description(&self) -> String {
        let (current, total) = self.progress();
        format!("{} ({} of {})", self.state, current, total)
    }

    /// Stimulus shown at 1-based `step`, `None` past the last step.
    pub fn stimulus_for_step(&self, step: u32) -> Option<Stimulus> {
        let depth = self.scan_depth;
        match step {
            1 => Some(Stimulus::Black),
            2 => Some(Stimulus::White),
            s if s >= 3 && s < 3 + depth => Some(Stimulus::Mask {
                axis: ScanAxis::Horizontal,
                bit: self.texture_size - (s - 2),
            }),
            s if s >= 3 + depth && s < 3 + 2 * depth => Some(Stimulus::Mask {
                axis: ScanAxis::Vertical,
                bit: self.texture_size - (s - 2 - depth),
            }),
            _ => None,
        }
    }

    pub fn black_reference(&self) -> Option<&GrayImage> {
        self.black_reference.as_ref()
    }

    pub fn white_reference(&self) -> Option<&GrayImage> {
        self.white_reference.as_ref()
    }

    /// The in-progress map, available once the white reference is captured.
    pub fn map(&self) -> Option<&PixelImage> {
        self.projection_map.as_ref()
    }

    /// Number of pixels still carrying a valid coordinate.
    pub fn mappable_count(&self) -> usize {
        self.projection_map
            .as_ref()
            .map(|map| map.pixels().filter(|(_, _, p)| p[3] == MAPPED_ALPHA).count())
            .unwrap_or(0)
    }

    /// Snapshot of the projection map with unmappable pixels cleared to
    /// transparent black, ready to be saved as PNG.
    pub fn projection_map(&self) -> Option<PixelImage> {
        let mut map = self.projection_map.clone()?;
        for (_, _, pixel) in map.pixels_mut() {
            if pixel[3] != MAPPED_ALPHA {
                *pixel = TRANSPARENT;
            }
        }
        Some(map)
    }

    /// Feed the capture for the current stimulus and advance exactly one step.
    ///
    /// A capture whose size differs from the black reference is rejected
    /// before any state changes.
    pub fn ingest(&mut self, capture: &PixelImage) -> Result<ScanState> {
        if self.done() {
            return Err(Error::SessionFinished);
        }
        if let Some(black) = &self.black_reference {
            if black.dimensions() != capture.dimensions() {
                return Err(Error::dimensions(black.dimensions(), capture.dimensions()));
            }
        }

        let luma = capture.to_luma();

        match self.state {
            ScanState::AwaitingBlack => {
                log::info!("Captured black reference ({}x{})", luma.width(), luma.height());
                self.black_reference = Some(luma);
                self.state = ScanState::AwaitingWhite;
            }
            ScanState::AwaitingWhite => {
                let map = self.initial_map(&luma)?;
                log::info!(
                    "Captured white reference, {} of {} pixels mappable",
                    map.pixels().filter(|(_, _, p)| p[3] == MAPPED_ALPHA).count(),
                    luma.width() as usize * luma.height() as usize
                );
                self.white_reference = Some(luma);
                self.projection_map = Some(map);
                self.state = ScanState::Scanning {
                    axis: ScanAxis::Horizontal,
                    bit: self.texture_size - 1,
                };
            }
            ScanState::Scanning { axis, bit } => {
                self.apply_bit_plane(&luma, axis, bit)?;
                self.state = self.next_state(axis, bit);
                if self.done() {
                    log::info!("Scan complete, {} pixels mapped", self.mappable_count());
                }
            }
            ScanState::Done => return Err(Error::SessionFinished),
        }

        Ok(self.state)
    }

    /// Pixels where black and white references cannot be told apart start
    /// unmappable, all others start at coordinate (0, 0).
    fn initial_map(&self, white: &GrayImage) -> Result<PixelImage> {
        let black = self
            .black_reference
            .as_ref()
            .ok_or_else(|| Error::Configuration("missing black reference".to_string()))?;

        Ok(PixelImage::from_fn(white.width(), white.height(), |x, y| {
            if black.get_pixel(x, y) == white.get_pixel(x, y) {
                TRANSPARENT
            } else {
                Rgba([0, 0, 0, MAPPED_ALPHA])
            }
        }))
    }

    /// Coordinate increment for `bit`, expressed in the 12-bit space.
    fn bit_weight(&self, bit: u32) -> u32 {
        1 << (COORDINATE_BITS - (self.texture_size - bit))
    }

    fn apply_bit_plane(&mut self, capture: &GrayImage, axis: ScanAxis, bit: u32) -> Result<()> {
        let (Some(black), Some(white)) = (&self.black_reference, &self.white_reference) else {
            return Err(Error::Configuration("missing reference captures".to_string()));
        };

        // Classify everything first so a failure leaves the map untouched.
        let responses = self.classifier.classify(capture, black, white)?;
        let weight = self.bit_weight(bit);

        let map = self
            .projection_map
            .as_mut()
            .ok_or_else(|| Error::Configuration("projection map not initialized".to_string()))?;

        let mut lost = 0usize;
        let mut lit = 0usize;
        for ((_, _, pixel), response) in map.pixels_mut().zip(responses) {
            if pixel[3] != MAPPED_ALPHA {
                continue;
            }
            match response {
                Response::Ambiguous => {
                    *pixel = TRANSPARENT;
                    lost += 1;
                }
                Response::MatchedWhite => {
                    match axis {
                        ScanAxis::Horizontal => {
                            let x = unpack_x(pixel) + weight;
                            pack_x(pixel, x);
                        }
                        ScanAxis::Vertical => {
                            let y = unpack_y(pixel) + weight;
                            pack_y(pixel, y);
                        }
                    }
                    lit += 1;
                }
                Response::MatchedBlack => {}
            }
        }

        log::debug!(
            "{} bit {}: {} pixels set, {} pixels became unmappable",
            axis,
            bit,
            lit,
            lost
        );
        Ok(())
    }

    fn next_state(&self, axis: ScanAxis, bit: u32) -> ScanState {
        if bit > self.min_scan_depth {
            ScanState::Scanning { axis, bit: bit - 1 }
        } else {
            match axis {
                ScanAxis::Horizontal => ScanState::Scanning {
                    axis: ScanAxis::Vertical,
                    bit: self.texture_size - 1,
                },
                ScanAxis::Vertical => ScanState::Done,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{unpack, Coordinate};

    /// A lossless optical system: the screenshot is the stimulus itself.
    fn drive_identity(session: &mut ScanSession) -> usize {
        let mut steps = 0;
        while let Some(stimulus) = session.current_stimulus() {
            session.ingest(&stimulus).unwrap();
            steps += 1;
        }
        steps
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(ScanSession::new(0, 0), Err(Error::Configuration(_))));
        assert!(matches!(ScanSession::new(13, 4), Err(Error::Configuration(_))));
        assert!(matches!(ScanSession::new(8, 9), Err(Error::Configuration(_))));
        assert!(matches!(ScanSession::new(8, 0), Err(Error::Configuration(_))));
        assert!(ScanSession::with_classifier(8, 8, ClassifierKind::Margin, 1.5).is_err());
        assert!(ScanSession::new(12, 12).is_ok());
        assert!(ScanSession::new(1, 1).is_ok());
    }

    #[test]
    fn test_state_sequence() {
        let mut session = ScanSession::new(3, 2).unwrap();
        let mut states = vec![session.state()];
        while !session.done() {
            let stimulus = session.current_stimulus().unwrap();
            states.push(session.ingest(&stimulus).unwrap());
        }

        let h = ScanAxis::Horizontal;
        let v = ScanAxis::Vertical;
        assert_eq!(
            states,
            vec![
                ScanState::AwaitingBlack,
                ScanState::AwaitingWhite,
                ScanState::Scanning { axis: h, bit: 2 },
                ScanState::Scanning { axis: h, bit: 1 },
                ScanState::Scanning { axis: v, bit: 2 },
                ScanState::Scanning { axis: v, bit: 1 },
                ScanState::Done,
            ]
        );
    }

    #[test]
    fn test_termination_step_count() {
        for texture_size in 1..=6 {
            for scan_depth in 1..=texture_size {
                let mut session = ScanSession::new(texture_size, scan_depth).unwrap();
                let steps = drive_identity(&mut session);
                assert_eq!(steps as u32, 2 + 2 * scan_depth);
                assert_eq!(steps as u32, session.total_steps());
                assert!(session.done());
            }
        }
    }

    #[test]
    fn test_identity_map_full_depth() {
        let mut session = ScanSession::new(4, 4).unwrap();
        drive_identity(&mut session);

        let map = session.projection_map().unwrap();
        assert_eq!(map.dimensions(), (16, 16));
        for (x, y, pixel) in map.pixels() {
            assert_eq!(pixel[3], MAPPED_ALPHA);
            assert_eq!(unpack(pixel), Coordinate::new(x * 256, y * 256));
        }
    }

    #[test]
    fn test_identity_map_partial_depth() {
        let mut session = ScanSession::new(4, 2).unwrap();
        drive_identity(&mut session);

        let map = session.projection_map().unwrap();
        for (x, y, pixel) in map.pixels() {
            assert_eq!(unpack(pixel), Coordinate::new((x & 0b1100) * 256, (y & 0b1100) * 256));
        }
    }

    #[test]
    fn test_alpha_invariant_after_every_step() {
        let mut session = ScanSession::new(3, 3).unwrap();
        let size = session.stimulus_size();
        let mut step = 0u32;
        while let Some(stimulus) = session.current_stimulus() {
            // Grey noise on one column makes some pixels ambiguous.
            let mut capture = stimulus;
            if step >= 2 {
                for y in 0..size {
                    capture.set(1, y, Rgba([128, 128, 128, 255])).unwrap();
                }
            }
            session.ingest(&capture).unwrap();
            step += 1;
            if let Some(map) = session.map() {
                assert!(map.pixels().all(|(_, _, p)| p[3] == 0 || p[3] == 255));
            }
        }
        assert_eq!(session.mappable_count(), (size * size - size) as usize);
    }

    #[test]
    fn test_indistinguishable_references_are_unmappable() {
        let mut session = ScanSession::new(2, 2).unwrap();
        let mut black = session.current_stimulus().unwrap();
        black.set(0, 0, Rgba([90, 90, 90, 255])).unwrap();
        session.ingest(&black).unwrap();

        let mut white = session.current_stimulus().unwrap();
        white.set(0, 0, Rgba([90, 90, 90, 255])).unwrap();
        session.ingest(&white).unwrap();

        let map = session.map().unwrap();
        assert_eq!(map.get(0, 0).unwrap()[3], 0);
        assert_eq!(map.get(1, 0).unwrap()[3], 255);
        assert_eq!(session.mappable_count(), 15);
    }

    #[test]
    fn test_ambiguous_pixel_stays_unmappable() {
        let mut session = ScanSession::new(2, 2).unwrap();
        drive_until_scanning(&mut session);

        // First bit-plane: pixel (3, 3) is grey and becomes unmappable.
        let mut capture = session.current_stimulus().unwrap();
        capture.set(3, 3, Rgba([128, 128, 128, 255])).unwrap();
        session.ingest(&capture).unwrap();
        assert_eq!(session.map().unwrap().get(3, 3).unwrap(), TRANSPARENT);

        // Later clean captures never revive it.
        drive_identity(&mut session);
        assert_eq!(session.projection_map().unwrap().get(3, 3).unwrap(), TRANSPARENT);
        assert_eq!(session.mappable_count(), 15);
    }

    fn drive_until_scanning(session: &mut ScanSession) {
        for _ in 0..2 {
            let stimulus = session.current_stimulus().unwrap();
            session.ingest(&stimulus).unwrap();
        }
    }

    #[test]
    fn test_references_are_greyscale_captures() {
        let mut session = ScanSession::new(2, 2).unwrap();
        assert!(session.black_reference().is_none());

        session.ingest(&PixelImage::filled(5, 3, Rgba([20, 20, 20, 255]))).unwrap();
        session.ingest(&PixelImage::filled(5, 3, Rgba([240, 240, 240, 255]))).unwrap();

        let black = session.black_reference().unwrap();
        let white = session.white_reference().unwrap();
        assert_eq!(black.dimensions(), (5, 3));
        assert_eq!(black.get_pixel(4, 2)[0], 20);
        assert_eq!(white.get_pixel(0, 0)[0], 240);
    }

    #[test]
    fn test_dimension_mismatch_does_not_mutate() {
        let mut session = ScanSession::new(3, 3).unwrap();
        drive_until_scanning(&mut session);
        let before = session.map().cloned();
        let state = session.state();

        let wrong = PixelImage::new(4, 8);
        assert!(matches!(session.ingest(&wrong), Err(Error::DimensionMismatch { .. })));
        assert_eq!(session.state(), state);
        assert_eq!(session.map().cloned(), before);
    }

    #[test]
    fn test_ingest_after_done() {
        let mut session = ScanSession::new(1, 1).unwrap();
        drive_identity(&mut session);
        let capture = PixelImage::new(2, 2);
        assert!(matches!(session.ingest(&capture), Err(Error::SessionFinished)));
        assert!(session.current_stimulus().is_none());
    }

    #[test]
    fn test_progress_and_description() {
        let mut session = ScanSession::new(4, 4).unwrap();
        assert_eq!(session.progress(), (1, 10));
        assert_eq!(session.step_description(), "All Black (1 of 10)");

        drive_until_scanning(&mut session);
        assert_eq!(session.progress(), (3, 10));
        assert_eq!(session.step_description(), "Horizontal 8 (3 of 10)");

        for _ in 0..4 {
            let stimulus = session.current_stimulus().unwrap();
            session.ingest(&stimulus).unwrap();
        }
        assert_eq!(session.step_description(), "Vertical 8 (7 of 10)");

        drive_identity(&mut session);
        assert_eq!(session.progress(), (10, 10));
        assert_eq!(session.step_description(), "Complete (10 of 10)");
    }

    #[test]
    fn test_stimulus_for_step_matches_live_sequence() {
        let mut session = ScanSession::new(5, 3).unwrap();
        let mut step = 1;
        while let Some(expected) = session.current_stimulus_kind() {
            assert_eq!(session.stimulus_for_step(step), Some(expected));
            let stimulus = session.current_stimulus().unwrap();
            session.ingest(&stimulus).unwrap();
            step += 1;
        }
        assert_eq!(step, 9);
        assert_eq!(session.stimulus_for_step(9), None);
        assert_eq!(session.stimulus_for_step(0), None);
    }

    #[test]
    fn test_restart_keeps_original() {
        let mut session = ScanSession::with_classifier(3, 2, ClassifierKind::Exact, 0.25).unwrap();
        drive_until_scanning(&mut session);

        let fresh = session.restart();
        assert_eq!(fresh.state(), ScanState::AwaitingBlack);
        assert_eq!(fresh.texture_size(), 3);
        assert_eq!(fresh.scan_depth(), 2);
        assert_eq!(fresh.classifier_kind(), ClassifierKind::Exact);
        assert!(fresh.map().is_none());

        assert!(matches!(session.state(), ScanState::Scanning { .. }));
        assert!(session.map().is_some());
    }

    #[test]
    fn test_exact_classifier_scan() {
        let mut session = ScanSession::with_classifier(3, 3, ClassifierKind::Exact, 0.5).unwrap();
        drive_identity(&mut session);
        let map = session.projection_map().unwrap();
        assert_eq!(unpack(&map.get(5, 2).unwrap()), Coordinate::new(5 * 512, 2 * 512));
    }
}
