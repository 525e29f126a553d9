extern crate trajopt;

use std::env;
use std::path::PathBuf;
use trajopt::ellipsoids::ellipsoid_fitter::{EllipsoidFitConfig, EllipsoidFitter};
use trajopt::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use trajopt::utils::utils_errors::TrajoptError;
use trajopt::utils::utils_files::SaveAndLoadable;

/// Usage: fit_link_ellipsoids <robot_name> [num_surface_samples] [output_path] [fit_config_path]
///
/// Fits one ellipsoid per link shape and saves the table so trajectory problems can load it.
fn main() -> Result<(), TrajoptError> {
    let args: Vec<String> = env::args().collect();
    assert!(args.len() >= 2, "First argument must be the given robot's name");

    let robot_name = args[1].as_str();
    let num_samples = match args.get(2) {
        None => { 200 }
        Some(s) => { s.parse::<usize>().map_err(|e| TrajoptError::new_generic_error_str(&format!("bad sample count {}: {}", s, e), file!(), line!()))? }
    };
    let output_path = match args.get(3) {
        None => { PathBuf::from(format!("{}_ellipsoids.json", robot_name)) }
        Some(s) => { PathBuf::from(s) }
    };
    let config = match args.get(4) {
        None => { EllipsoidFitConfig::default() }
        Some(s) => { EllipsoidFitConfig::load_from_path(&PathBuf::from(s))? }
    };

    let descriptors = EllipsoidFitter::fit_robot_links(robot_name, num_samples, 0, &config)?;
    for d in &descriptors {
        let e = d.ellipsoid();
        trajopt_print(&format!("{} (joint {})", d.name(), d.joint_idx()), PrintMode::Println, PrintColor::Blue, true);
        trajopt_print(&format!("   w = {:.5?}, c = {:.5?}, r = {:.5?}", e.rotation_vector().as_slice(), e.center().as_slice(), e.radii().as_slice()), PrintMode::Println, PrintColor::None, false);
    }
    descriptors.save_to_path(&output_path)?;
    trajopt_print(&format!("saved {} ellipsoids to {:?}", descriptors.len(), output_path), PrintMode::Println, PrintColor::Green, true);
    Ok(())
}
