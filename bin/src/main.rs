#[macro_use]
extern crate log;

mod app;

use app::*;
use clap::Parser;
use common::image::ScalarImage;
use common::image_io::*;
use filters::MaskFilter;
use integrators::*;

fn main() {
    // Initialize `env_logger`.
    env_logger::init();

    let options = Options::parse();
    if let Err(e) = run(&options) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), String> {
    let moments = load_moments(&options.moments_file)?;
    let (width, height) = (moments[0].1.width(), moments[0].1.height());

    let reference = ScalarImage::from_rgb(&read_rgb_exr(&options.reference_file)?);
    if reference.width() != width || reference.height() != height {
        return Err(format!(
            "Reference {} is {}x{}, moments are {width}x{height}",
            options.reference_file,
            reference.width(),
            reference.height()
        ));
    }

    let mut connection_counts: Vec<u32> = moments.iter().map(|(c, _)| c.num_connections).collect();
    connection_counts.sort_unstable();
    connection_counts.dedup();

    let mut cost = CostModel::new(options.cost_parameters()?);
    cost.update_stats(
        width * height,
        options.num_light_paths,
        options.avg_cam_len,
        options.avg_light_len,
        options.avg_photons_per_query,
    );

    let estimator = ProxyMomentEstimator::from_images(moments);

    let mask_filter = if options.no_mask_filter {
        MaskFilter::identity()
    } else {
        MaskFilter::default()
    };
    let masks = optimize_per_pixel(
        estimator.buffers(),
        width,
        height,
        &cost,
        &PerPixelSettings {
            per_pixel_merge: options.per_pixel_merge,
            per_pixel_connect: options.per_pixel_connect,
            merge_filter: mask_filter,
            connect_filter: mask_filter,
            num_threads: options.n_threads,
        },
    );

    let knobs = SamplingKnobs {
        merge_enabled: masks.merge.is_some(),
        merge_mask: masks.merge,
        connect_mask: masks.connect,
        ..SamplingKnobs::default()
    };
    let decision = optimize_per_image(
        estimator.buffers(),
        &reference,
        &connection_counts,
        &cost,
        &knobs,
        &PerImageSettings {
            per_pixel_connect: options.per_pixel_connect,
            per_pixel_merge: options.per_pixel_merge,
            num_threads: options.n_threads,
        },
    );
    info!(
        "Per-image decision: {} (work {:.4e}, {} outliers)",
        decision.candidate(),
        decision.work,
        decision.num_outliers
    );
    println!("{}", decision.candidate());

    if let Some(path) = options.masks_file.as_ref() {
        let mut layers: Vec<(String, &ScalarImage)> = Vec::new();
        if let Some(mask) = knobs.merge_mask.as_ref() {
            layers.push(("merge".to_string(), mask));
        }
        if let Some(mask) = knobs.connect_mask.as_ref() {
            layers.push(("connect".to_string(), mask));
        }
        if layers.is_empty() {
            warn!("No per-pixel decisions requested, not writing {path}");
        } else {
            write_layered_exr(path, &layers)?;
        }
    }

    Ok(())
}

/// Reads the moment layers and orders them so path tracing comes first,
/// followed by ascending light path and connection counts.
///
/// * `path` - Layered moment image.
fn load_moments(path: &str) -> Result<Vec<(Candidate, ScalarImage)>, String> {
    let mut moments = read_layered_exr(path)?
        .into_iter()
        .map(|(name, img)| name.parse::<Candidate>().map(|c| (c, img)))
        .collect::<Result<Vec<_>, String>>()?;
    moments.sort_by_key(|(c, _)| *c);

    let Some((_, first)) = moments.first() else {
        return Err(format!("No moment layers in {path}"));
    };
    if let Some((c, _)) = moments.iter().find(|(_, img)| !img.same_size(first)) {
        return Err(format!("Moment layer '{c}' in {path} differs in size"));
    }
    if !moments.iter().any(|(c, _)| c.is_path_tracing()) {
        return Err(format!("{path} has no path tracing layer"));
    }
    Ok(moments)
}
