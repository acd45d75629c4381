use argh::FromArgs;
use std::{ops::ControlFlow, path::PathBuf};

use cpd::core::{transforms::rotation_2d, PointSet};
use cpd::registration::{self as reg, RigidConfig};

#[derive(FromArgs)]
/// Example of rigid CPD registration on a synthetic 2D shape
struct Args {
    /// rotation applied to the fixed shape, in degrees
    #[argh(option, default = "30.0")]
    angle: f64,

    /// uniform scale applied to the fixed shape
    #[argh(option, default = "1.0")]
    scale: f64,

    /// number of points of the shape
    #[argh(option, default = "91")]
    num_points: usize,

    /// expected fraction of outliers
    #[argh(option)]
    outlier_weight: Option<f64>,

    /// disable scale estimation
    #[argh(switch)]
    no_scaling: bool,

    /// register normalized copies of the point sets
    #[argh(switch)]
    normalize: bool,

    /// path to a JSON registration config, command line flags override it
    #[argh(option)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<RigidConfig>(&std::fs::read_to_string(path)?)?,
        None => RigidConfig::default(),
    };
    if let Some(outlier_weight) = args.outlier_weight {
        config.outlier_weight = outlier_weight;
    }
    config.allow_scaling &= !args.no_scaling;
    config.normalize |= args.normalize;

    let rows = (0..args.num_points)
        .map(|i| {
            let t = i as f64 / args.num_points as f64 * std::f64::consts::TAU;
            [
                2.0 * t.cos() + 0.3 * (2.0 * t).cos(),
                0.7 * t.sin() + 0.2 * (3.0 * t).sin() + 0.25 * (3.0 * t).cos(),
            ]
        })
        .collect::<Vec<_>>();
    let moving = PointSet::from_rows(&rows)?;

    let rotation = rotation_2d(args.angle.to_radians());
    let translation = faer::col![0.5, -0.25];
    let fixed = moving.transformed(rotation.as_ref(), args.scale, translation.as_ref());
    println!("Fixed: #{} points, moving: #{} points", fixed.len(), moving.len());

    let result = reg::rigid_registration_with_observer(&fixed, &moving, &config, |report| {
        log::info!(
            "iteration {} sigma2 {:e} change {:e}",
            report.iteration,
            report.sigma2,
            report.relative_change
        );
        ControlFlow::Continue(())
    })?;

    let estimated_angle = result
        .transform
        .rotation
        .read(1, 0)
        .atan2(result.transform.rotation.read(0, 0));

    println!(
        "CPD finished with {:?} after {} iterations in {:?}",
        result.termination, result.iterations, result.runtime
    );
    println!("sigma2: {:e}", result.sigma2);
    println!(
        "angle: {:.4} deg (expected {:.4}), scale: {:.4} (expected {:.4})",
        estimated_angle.to_degrees(),
        args.angle,
        result.transform.scale,
        args.scale
    );
    println!("homogeneous matrix: {:?}", result.transform.matrix());

    Ok(())
}
