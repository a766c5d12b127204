use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::convert::{deinterleave, interleave};
use crate::error::{Error, Result};

const CHUNK_FRAMES: usize = 1024;

/// Streaming sample-rate converter over rubato's fixed-chunk resampler.
///
/// Decoded frames come in arbitrary sizes, so input is buffered per
/// channel and handed to rubato in `CHUNK_FRAMES` blocks; [`Self::finish`]
/// pushes the final partial block and drains the delay line.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self> {
        let inner = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels as usize,
        )
        .map_err(|e| Error::Resample(format!("resampler init: {e}")))?;

        Ok(Self {
            inner,
            pending: vec![Vec::new(); channels as usize],
        })
    }

    /// Feed interleaved input, returning whatever full blocks produced.
    pub fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let planar = deinterleave(interleaved, self.pending.len());
        for (pending, ch) in self.pending.iter_mut().zip(planar) {
            pending.extend(ch);
        }

        let mut out = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();
            let blocks = self
                .inner
                .process(&chunk, None)
                .map_err(|e| Error::Resample(e.to_string()))?;
            out.extend(interleave(&blocks));
        }
        Ok(out)
    }

    /// Flush buffered input and the resampler's internal delay.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let mut out = Vec::new();

        if !self.pending[0].is_empty() {
            let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
            let blocks = self
                .inner
                .process_partial(Some(&chunk), None)
                .map_err(|e| Error::Resample(e.to_string()))?;
            out.extend(interleave(&blocks));
        }

        let blocks = self
            .inner
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        out.extend(interleave(&blocks));

        Ok(out)
    }
}
