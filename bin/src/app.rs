//! Command line options

use clap::Parser;
use common::math::Float;
use integrators::CostParameters;

/// Offline optimisation of VCM sampling decisions from stored moment images.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Options {
    /// Layered moment image.
    #[clap(
        long = "moments",
        short = 'm',
        value_name = "FILE",
        help = "Layered EXR with one moment image per candidate."
    )]
    pub moments_file: String,

    /// Reference image.
    #[clap(
        long = "reference",
        short = 'r',
        value_name = "FILE",
        help = "RGB EXR with a denoised or converged rendering."
    )]
    pub reference_file: String,

    /// Path to the mask image.
    #[clap(
        long = "outfile",
        short = 'o',
        value_name = "FILE",
        help = "Write the decision masks to the given filename."
    )]
    pub masks_file: Option<String>,

    /// Per-pixel merge decisions.
    #[clap(long = "per-pixel-merge", help = "Decide merging per pixel.")]
    pub per_pixel_merge: bool,

    /// Per-pixel connection counts.
    #[clap(long = "per-pixel-connect", help = "Decide the connection count per pixel.")]
    pub per_pixel_connect: bool,

    /// Skip mask dilation and blurring.
    #[clap(long = "no-mask-filter", help = "Use the raw per-pixel decisions as masks.")]
    pub no_mask_filter: bool,

    /// Number of threads.
    #[clap(
        long = "nthreads",
        short = 't',
        value_name = "NUM",
        default_value_t = 0,
        help = "Use specified number of threads (0 uses all cores)."
    )]
    pub n_threads: usize,

    /// Light subpaths traced when the statistics were recorded.
    #[clap(
        long = "light-paths",
        value_name = "NUM",
        default_value_t = 0,
        help = "Number of light subpaths per iteration of the recording render."
    )]
    pub num_light_paths: u32,

    /// Average camera subpath length.
    #[clap(long = "cam-len", value_name = "FLOAT", default_value_t = 0.0, help = "Average camera path length.")]
    pub avg_cam_len: Float,

    /// Average light subpath length.
    #[clap(long = "light-len", value_name = "FLOAT", default_value_t = 0.0, help = "Average light path length.")]
    pub avg_light_len: Float,

    /// Average photons per merge query.
    #[clap(
        long = "photons-per-query",
        value_name = "FLOAT",
        default_value_t = 0.0,
        help = "Average number of photons found by a merge query."
    )]
    pub avg_photons_per_query: Float,

    #[clap(long = "cost-light", value_name = "FLOAT", default_value_t = 1.0, help = "Cost of a light path edge.")]
    pub cost_light: Float,

    #[clap(long = "cost-camera", value_name = "FLOAT", default_value_t = 1.0, help = "Cost of a camera path edge.")]
    pub cost_camera: Float,

    #[clap(long = "cost-connect", value_name = "FLOAT", default_value_t = 0.3, help = "Cost of a connection.")]
    pub cost_connect: Float,

    #[clap(long = "cost-shade", value_name = "FLOAT", default_value_t = 0.65, help = "Cost of shading a photon.")]
    pub cost_shade: Float,

    #[clap(long = "cost-query", value_name = "FLOAT", default_value_t = 0.3, help = "Cost of a photon map query.")]
    pub cost_query: Float,

    #[clap(
        long = "cost-build",
        value_name = "FLOAT",
        default_value_t = 0.1,
        help = "Cost of inserting a photon into the photon map."
    )]
    pub cost_photon_build: Float,
}

impl Options {
    /// Returns the cost model hyper-parameters.
    pub fn cost_parameters(&self) -> Result<CostParameters, String> {
        let params = CostParameters {
            cost_light: self.cost_light,
            cost_camera: self.cost_camera,
            cost_connect: self.cost_connect,
            cost_shade: self.cost_shade,
            cost_query: self.cost_query,
            cost_photon_build: self.cost_photon_build,
        };
        let all = [
            params.cost_light,
            params.cost_camera,
            params.cost_connect,
            params.cost_shade,
            params.cost_query,
            params.cost_photon_build,
        ];
        if all.iter().any(|c| !c.is_finite() || *c < 0.0) || params.cost_camera <= 0.0 {
            return Err("Cost parameters must be finite and non-negative, camera cost positive".to_string());
        }
        Ok(params)
    }
}
