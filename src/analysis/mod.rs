// Analysis module - DSP pipeline building blocks
//
// The pipeline orchestrator wires these together: streaming onset detection
// feeds the metronome detector, which locks a beat grid that the grid aligner
// scores played notes against. The feature extractor supplies the spectral
// side of click/note classification, and the offline detector serves
// calibration recordings.

pub mod features;
pub mod grid;
pub mod metronome;
pub mod offline;
pub mod onset;
