use std::time::Duration;
use nalgebra::{DVector, Vector3};
use serde::{Serialize, Deserialize};
use crate::ellipsoids::ellipsoid::EllipsoidDescriptor;
use crate::robot_modules::robot_kinematics_module::RobotKinematicsModule;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode};
use crate::utils::utils_errors::TrajoptError;
use crate::utils::utils_se3::se3_pose::SE3Pose;

/// RGBA, each channel in `[0, 1]`.
pub type Color = [f64; 4];

/// Anything a scene can be drawn on.  Implementations only observe; nothing drawn feeds back
/// into a solve.
pub trait VisualizerSink {
    fn add_box(&mut self, name: &str, dimensions: &Vector3<f64>, color: Color) -> Result<(), TrajoptError>;
    fn add_sphere(&mut self, name: &str, radius: f64, color: Color) -> Result<(), TrajoptError>;
    fn add_ellipsoid(&mut self, name: &str, radii: &Vector3<f64>, color: Color) -> Result<(), TrajoptError>;
    /// Places a previously added object at `placement` in the world.
    fn apply_configuration(&mut self, name: &str, placement: &SE3Pose) -> Result<(), TrajoptError>;
    /// Draws the robot at configuration `q`.
    fn display(&mut self, q: &DVector<f64>) -> Result<(), TrajoptError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VisualizerEvent {
    AddBox { name: String, dimensions: Vector3<f64>, color: Color },
    AddSphere { name: String, radius: f64, color: Color },
    AddEllipsoid { name: String, radii: Vector3<f64>, color: Color },
    ApplyConfiguration { name: String, placement: SE3Pose },
    Display { q: DVector<f64> }
}

/// Keeps every call in order.  Placing an object that was never added is an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordingVisualizer {
    events: Vec<VisualizerEvent>,
    object_names: Vec<String>
}
impl RecordingVisualizer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn events(&self) -> &Vec<VisualizerEvent> {
        &self.events
    }
    pub fn object_names(&self) -> &Vec<String> {
        &self.object_names
    }
    pub fn num_displays(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, VisualizerEvent::Display { .. })).count()
    }
    /// The most recent placement applied to `name`.
    pub fn last_placement(&self, name: &str) -> Option<&SE3Pose> {
        self.events.iter().rev().find_map(|e| match e {
            VisualizerEvent::ApplyConfiguration { name: n, placement } if n == name => { Some(placement) }
            _ => { None }
        })
    }
    pub fn clear(&mut self) {
        self.events.clear();
        self.object_names.clear();
    }
    fn add_object(&mut self, name: &str, event: VisualizerEvent) -> Result<(), TrajoptError> {
        if self.object_names.iter().any(|n| n == name) {
            return Err(TrajoptError::new_generic_error_str(&format!("object {} was already added to the visualizer.", name), file!(), line!()));
        }
        self.object_names.push(name.to_string());
        self.events.push(event);
        Ok(())
    }
}
impl VisualizerSink for RecordingVisualizer {
    fn add_box(&mut self, name: &str, dimensions: &Vector3<f64>, color: Color) -> Result<(), TrajoptError> {
        self.add_object(name, VisualizerEvent::AddBox { name: name.to_string(), dimensions: *dimensions, color })
    }
    fn add_sphere(&mut self, name: &str, radius: f64, color: Color) -> Result<(), TrajoptError> {
        self.add_object(name, VisualizerEvent::AddSphere { name: name.to_string(), radius, color })
    }
    fn add_ellipsoid(&mut self, name: &str, radii: &Vector3<f64>, color: Color) -> Result<(), TrajoptError> {
        self.add_object(name, VisualizerEvent::AddEllipsoid { name: name.to_string(), radii: *radii, color })
    }
    fn apply_configuration(&mut self, name: &str, placement: &SE3Pose) -> Result<(), TrajoptError> {
        if !self.object_names.iter().any(|n| n == name) {
            return Err(TrajoptError::new_generic_error_str(&format!("object {} is not in the visualizer.", name), file!(), line!()));
        }
        self.events.push(VisualizerEvent::ApplyConfiguration { name: name.to_string(), placement: placement.clone() });
        Ok(())
    }
    fn display(&mut self, q: &DVector<f64>) -> Result<(), TrajoptError> {
        self.events.push(VisualizerEvent::Display { q: q.clone() });
        Ok(())
    }
}

/// Prints every call to the console.
#[derive(Clone, Debug)]
pub struct ConsoleVisualizer {
    print_placements: bool
}
impl ConsoleVisualizer {
    pub fn new(print_placements: bool) -> Self {
        Self { print_placements }
    }
}
impl VisualizerSink for ConsoleVisualizer {
    fn add_box(&mut self, name: &str, dimensions: &Vector3<f64>, _color: Color) -> Result<(), TrajoptError> {
        trajopt_print(&format!("[viz] box {} {:.3?}", name, dimensions.as_slice()), PrintMode::Println, PrintColor::Cyan, false);
        Ok(())
    }
    fn add_sphere(&mut self, name: &str, radius: f64, _color: Color) -> Result<(), TrajoptError> {
        trajopt_print(&format!("[viz] sphere {} {:.3}", name, radius), PrintMode::Println, PrintColor::Cyan, false);
        Ok(())
    }
    fn add_ellipsoid(&mut self, name: &str, radii: &Vector3<f64>, _color: Color) -> Result<(), TrajoptError> {
        trajopt_print(&format!("[viz] ellipsoid {} {:.3?}", name, radii.as_slice()), PrintMode::Println, PrintColor::Cyan, false);
        Ok(())
    }
    fn apply_configuration(&mut self, name: &str, placement: &SE3Pose) -> Result<(), TrajoptError> {
        if self.print_placements {
            trajopt_print(&format!("[viz] {} at {:.4?}", name, placement.translation().as_slice()), PrintMode::Println, PrintColor::None, false);
        }
        Ok(())
    }
    fn display(&mut self, q: &DVector<f64>) -> Result<(), TrajoptError> {
        trajopt_print(&format!("[viz] q = {:.4?}", q.as_slice()), PrintMode::Println, PrintColor::Blue, false);
        Ok(())
    }
}

/// A reaching task drawn as two boxes: the target placement and the current tool frame.
pub struct TaskScene<'a> {
    kinematics: &'a RobotKinematicsModule,
    frame_idx: usize,
    target: SE3Pose,
    target_name: String,
    tip_name: String
}
impl<'a> TaskScene<'a> {
    pub fn new(kinematics: &'a RobotKinematicsModule, frame_name: &str, target: SE3Pose) -> Result<Self, TrajoptError> {
        let frame_idx = kinematics.model().get_frame_idx(frame_name)?;
        Ok(Self { kinematics, frame_idx, target, target_name: "world/box".to_string(), tip_name: "world/blue".to_string() })
    }
    pub fn target_name(&self) -> &str {
        &self.target_name
    }
    pub fn tip_name(&self) -> &str {
        &self.tip_name
    }
    pub fn add_to(&self, sink: &mut dyn VisualizerSink) -> Result<(), TrajoptError> {
        sink.add_box(&self.target_name, &Vector3::new(0.05, 0.1, 0.2), [1.0, 0.2, 0.2, 0.5])?;
        sink.add_box(&self.tip_name, &Vector3::new(0.08, 0.08, 0.08), [0.2, 0.2, 1.0, 0.5])
    }
    /// Places the target and tip boxes, draws the robot at `q`, then waits `pause` if given.
    pub fn display_scene(&self, sink: &mut dyn VisualizerSink, q: &DVector<f64>, pause: Option<Duration>) -> Result<(), TrajoptError> {
        let tip = self.kinematics.frame_placement(q, self.frame_idx)?;
        sink.apply_configuration(&self.target_name, &self.target)?;
        sink.apply_configuration(&self.tip_name, &tip)?;
        sink.display(q)?;
        if let Some(pause) = pause { std::thread::sleep(pause); }
        Ok(())
    }
    /// Replays `qs[1..]`; the first configuration is the starting scene and is not redrawn.
    pub fn display_trajectory(&self, sink: &mut dyn VisualizerSink, qs: &[DVector<f64>], pause: Option<Duration>) -> Result<(), TrajoptError> {
        for q in qs.iter().skip(1) {
            self.display_scene(sink, q, pause)?;
        }
        Ok(())
    }
}

pub fn ellipsoid_object_name(descriptor: &EllipsoidDescriptor) -> String {
    format!("world/el_{}", descriptor.name())
}

pub fn add_ellipsoids(sink: &mut dyn VisualizerSink, descriptors: &[EllipsoidDescriptor], color: Color) -> Result<(), TrajoptError> {
    for d in descriptors {
        sink.add_ellipsoid(&ellipsoid_object_name(d), d.ellipsoid().radii(), color)?;
    }
    Ok(())
}

/// Poses every ellipsoid on its joint at configuration `q` and draws the robot.
pub fn display_ellipsoids(sink: &mut dyn VisualizerSink, kinematics: &RobotKinematicsModule, descriptors: &[EllipsoidDescriptor], q: &DVector<f64>) -> Result<(), TrajoptError> {
    let fk = kinematics.compute_fk(q)?;
    for d in descriptors {
        let joint_placement = fk.get_joint_placement(d.joint_idx())?;
        sink.apply_configuration(&ellipsoid_object_name(d), &joint_placement.multiply(&d.ellipsoid().pose()))?;
    }
    sink.display(q)
}
