//! Image I/O

use crate::image::*;
use crate::math::*;
use exr::prelude as exrs;
use exr::prelude::*;
use std::result::Result;

/// Name of the channel used for single channel layers.
const SCALAR_CHANNEL: &str = "Y";

/// Read a single layer RGB OpenEXR file.
///
/// * `path` - Input file path.
pub fn read_rgb_exr(path: &str) -> Result<RgbImage, String> {
    let reader = exrs::read()
        .no_deep_data()
        .largest_resolution_level()
        .rgba_channels(
            |resolution, _channels| RgbImage::new(resolution.width(), resolution.height()),
            |img: &mut RgbImage, position, (r, g, b, _a): (f32, f32, f32, f32)| {
                img.set(position.x(), position.y(), [r, g, b]);
            },
        )
        .first_valid_layer()
        .all_attributes();

    match reader.from_file(path) {
        Ok(image) => {
            let pixels = image.layer_data.channel_data.pixels;
            info!("Read EXR image {path} ({} x {})", pixels.width(), pixels.height());
            Ok(pixels)
        }
        Err(err) => Err(format!("Error reading EXR image {path}: {err}")),
    }
}

/// Writes an RGB image as a single layer OpenEXR file.
///
/// * `path` - Output file path.
/// * `rgb`  - The image.
pub fn write_rgb_exr(path: &str, rgb: &RgbImage) -> Result<(), String> {
    info!("Writing image {path} with resolution {}x{}", rgb.width(), rgb.height());

    let size = Vec2(rgb.width(), rgb.height());
    let layer = Layer::new(
        size,
        LayerAttributes::named("render"),
        Encoding::SMALL_LOSSLESS,
        SpecificChannels::rgb(|pos: Vec2<usize>| {
            let [r, g, b] = rgb.get(pos.x(), pos.y());
            (r, g, b)
        }),
    );

    let attributes = ImageAttributes::new(IntegerBounds::from_dimensions(size));
    Image::empty(attributes)
        .with_layer(layer)
        .write()
        .to_file(path)
        .map_err(|err| format!("Error saving output image {path}: {err}"))
}

/// Writes a set of equally sized scalar images into one OpenEXR file, one
/// named layer per image.
///
/// * `path`   - Output file path.
/// * `layers` - Layer names and images.
pub fn write_layered_exr(path: &str, layers: &[(String, &ScalarImage)]) -> Result<(), String> {
    let Some((_, first)) = layers.first() else {
        return Err(format!("Refusing to write {path} without any layers"));
    };
    let size = Vec2(first.width(), first.height());
    if let Some((name, _)) = layers.iter().find(|(_, img)| !img.same_size(first)) {
        return Err(format!("Layer '{name}' in {path} does not match size {}x{}", size.0, size.1));
    }

    info!("Writing {} layers to {path} with resolution {}x{}", layers.len(), size.0, size.1);

    let exr_layers: Vec<Layer<AnyChannels<FlatSamples>>> = layers
        .iter()
        .map(|(name, img)| {
            let channel = AnyChannel::new(SCALAR_CHANNEL, FlatSamples::F32(img.to_vec()));
            Layer::new(
                size,
                LayerAttributes::named(name.as_str()),
                Encoding::SMALL_LOSSLESS,
                AnyChannels::sort(SmallVec::from_vec(vec![channel])),
            )
        })
        .collect();

    let attributes = ImageAttributes::new(IntegerBounds::from_dimensions(size));
    Image::from_layers(attributes, SmallVec::from_vec(exr_layers))
        .write()
        .to_file(path)
        .map_err(|err| format!("Error saving layered image {path}: {err}"))
}

/// Reads every layer of an OpenEXR file as a scalar image. Layers with more
/// than one channel are reduced to the average of their channels.
///
/// * `path` - Input file path.
pub fn read_layered_exr(path: &str) -> Result<Vec<(String, ScalarImage)>, String> {
    let image = exrs::read_all_flat_layers_from_file(path)
        .map_err(|err| format!("Error reading layered image {path}: {err}"))?;

    let mut result = Vec::with_capacity(image.layer_data.len());
    for (index, layer) in image.layer_data.iter().enumerate() {
        let (width, height) = (layer.size.width(), layer.size.height());
        let name = layer
            .attributes
            .layer_name
            .as_ref()
            .map_or_else(|| format!("layer{index}"), |text| text.to_string());

        let channels = &layer.channel_data.list;
        if channels.is_empty() {
            warn!("Skipping layer '{name}' in {path} without channels");
            continue;
        }

        let mut values = vec![0.0 as Float; width * height];
        for channel in channels.iter() {
            for (v, s) in values.iter_mut().zip(channel.sample_data.values_as_f32()) {
                *v += s;
            }
        }
        let inv = 1.0 / channels.len() as Float;
        values.iter_mut().for_each(|v| *v *= inv);

        result.push((name, ScalarImage::from_values(&values, width, height)));
    }

    info!("Read {} layers from {path}", result.len());
    Ok(result)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    fn temp_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("common-image-io-{}-{name}", std::process::id()));
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn layered_exr_keeps_names_and_values() {
        let a = ScalarImage::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        let b = ScalarImage::filled(3, 2, 0.5);
        let path = temp_path("layers.exr");

        write_layered_exr(&path, &[("first".to_string(), &a), ("second".to_string(), &b)]).unwrap();
        let layers = read_layered_exr(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(layers.len(), 2);
        let first = layers.iter().find(|(n, _)| n == "first").unwrap();
        assert!(approx_eq!(Float, first.1.get(2, 1), 6.0));
        assert!(approx_eq!(Float, first.1.get(0, 0), 1.0));
        let second = layers.iter().find(|(n, _)| n == "second").unwrap();
        assert!(approx_eq!(Float, second.1.mean(), 0.5));
    }

    #[test]
    fn layered_exr_rejects_mismatched_sizes() {
        let a = ScalarImage::new(2, 2);
        let b = ScalarImage::new(3, 2);
        let path = temp_path("bad.exr");
        assert!(write_layered_exr(&path, &[("a".to_string(), &a), ("b".to_string(), &b)]).is_err());
    }

    #[test]
    fn rgb_exr_round_trip_keeps_pixels() {
        let mut rgb = RgbImage::new(2, 2);
        rgb.set(1, 1, [0.25, 0.5, 1.0]);
        let path = temp_path("rgb.exr");
        write_rgb_exr(&path, &rgb).unwrap();
        let back = read_rgb_exr(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back.get(1, 1), [0.25, 0.5, 1.0]);
    }
}
