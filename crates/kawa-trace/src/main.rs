//! Trace a skeletonized mask image into a node/link graph and write it
//! out as JSON.

use std::path::PathBuf;

use clap::Parser;
use image::GrayImage;
use kawa_graph::{skeleton_to_graph, ResolveConfig};

/// Trace a skeletonized mask image into a node/link graph JSON file.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Input skeleton image path (any format `image` can decode).
    input: PathBuf,

    /// Output JSON path.
    #[arg(short, long)]
    output: PathBuf,

    /// Luma threshold above which a pixel counts as skeleton.
    #[arg(long, value_name = "0-255", default_value_t = 127)]
    threshold: u8,

    /// Upper bound on the branchpoint analysis window edge length.
    #[arg(long, value_name = "PIXELS", default_value_t = 51)]
    max_window: usize,

    /// Hard cap on walk iterations; omit to derive one from the image
    /// size.
    #[arg(long, value_name = "N")]
    max_iterations: Option<usize>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

/// Threshold an arbitrary decoded image down to a clean binary mask.
fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    eprintln!("Reading skeleton from {}", args.input.display());
    let gray = image::open(&args.input)?.into_luma8();
    let mask = binarize(&gray, args.threshold);
    let on = mask.pixels().filter(|p| p.0[0] != 0).count();
    eprintln!(
        "Mask: {}x{}, {on} skeleton pixels",
        mask.width(),
        mask.height()
    );

    let config = ResolveConfig {
        max_window: args.max_window,
        max_iterations: args.max_iterations,
    };

    eprintln!("Resolving graph...");
    let graph = skeleton_to_graph(&mask, &config)?;
    eprintln!(
        "Resolved {} nodes and {} links",
        graph.node_count(),
        graph.link_count()
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&graph)?
    } else {
        serde_json::to_string(&graph)?
    };
    std::fs::write(&args.output, json)?;
    eprintln!("Wrote {}", args.output.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn binarize_splits_on_the_threshold() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, image::Luma([127]));
        gray.put_pixel(1, 0, image::Luma([128]));
        let mask = binarize(&gray, 127);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 255);
    }
}
