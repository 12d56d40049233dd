use crate::audio::buffer::AudioBufferMut;

/// One output channel of one voice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pin {
    pub voice: usize,
    pub channel: usize,
}

/// A summing point for one output channel of the pool.
///
/// The input list is allocated up front for the largest possible number of connections,
/// so connecting never allocates on the render thread.
pub struct MixNode {
    inputs: Vec<Pin>,
    output: Box<[f32]>,
    frames: usize,
}

impl MixNode {
    pub fn new(max_inputs: usize, max_block_size: usize) -> Self {
        Self {
            inputs: Vec::with_capacity(max_inputs),
            output: vec![0.0; max_block_size].into_boxed_slice(),
            frames: 0,
        }
    }

    /// Adds `pin` to the inputs. Connecting a pin that is already connected does nothing,
    /// so restarting a playing voice never duplicates it. Returns `true` if the pin was
    /// added.
    pub fn connect(&mut self, pin: Pin) -> bool {
        if self.inputs.contains(&pin) {
            return false;
        }
        debug_assert!(
            self.inputs.len() < self.inputs.capacity(),
            "mix node input list is full"
        );
        self.inputs.push(pin);
        true
    }

    /// Removes `pin` from the inputs. Returns `true` if it was connected.
    pub fn disconnect(&mut self, pin: Pin) -> bool {
        match self.inputs.iter().position(|p| *p == pin) {
            Some(idx) => {
                self.inputs.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn inputs(&self) -> &[Pin] {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Replaces the output with the sum of `frames` samples from every connected pin.
    pub fn sum<'a>(&mut self, frames: usize, source: impl Fn(Pin) -> &'a [f32]) {
        let frames = frames.min(self.output.len());
        let output = &mut self.output[..frames];
        output.clear();
        for &pin in &self.inputs {
            output.add(&source(pin)[..frames]);
        }
        self.frames = frames;
    }

    /// The summed signal of the most recent `sum`.
    pub fn output(&self) -> &[f32] {
        &self.output[..self.frames]
    }
}
