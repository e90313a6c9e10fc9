
/// Tracks progressive accumulation. Any number of invalidations between
/// two frames collapse into a single reset at the start of the next one.
#[derive(Default, Debug, Clone)]
pub struct AccumulationController
{
    needs_reset: bool,
    accum_frame: u32,
    total_samples: u64,
    gpu_frame: u32,
    resets: u64,
}

impl AccumulationController
{
    pub fn new() -> Self
    {
        // The images start uninitialized, so the first frame clears them.
        return Self { needs_reset: true, ..Default::default() };
    }

    pub fn invalidate(&mut self)
    {
        self.needs_reset = true;
    }

    pub fn needs_reset(&self) -> bool
    {
        return self.needs_reset;
    }

    /// Consumes the reset flag. When this returns true the caller must
    /// clear the accumulation and output images before tracing.
    pub fn begin_frame_reset(&mut self) -> bool
    {
        if !self.needs_reset { return false; }

        self.needs_reset = false;
        self.accum_frame = 0;
        self.total_samples = 0;
        self.resets += 1;
        return true;
    }

    pub fn record_traced_frame(&mut self, spp: u32)
    {
        self.accum_frame = self.accum_frame.wrapping_add(1);
        self.total_samples += spp as u64;
    }

    pub fn advance_gpu_frame(&mut self)
    {
        self.gpu_frame = self.gpu_frame.wrapping_add(1);
    }

    pub fn accum_frame(&self) -> u32
    {
        return self.accum_frame;
    }

    pub fn total_samples(&self) -> u64
    {
        return self.total_samples;
    }

    pub fn gpu_frame(&self) -> u32
    {
        return self.gpu_frame;
    }

    pub fn reset_count(&self) -> u64
    {
        return self.resets;
    }
}
