use std::io::Write;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::MapperConfig;
use crate::error::Result;
use crate::map::MapStore;
use crate::plane::PlaneFit;
use crate::visualization::MapSnapshot;

/// Serializes an object to a pretty JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Loads and validates a mapper configuration. Missing fields take defaults.
pub fn config_from_json<P: AsRef<Path>>(file_path: P) -> Result<MapperConfig> {
    let config: MapperConfig = object_from_json(file_path)?;
    config.validate()?;
    Ok(config)
}

pub fn write_map_json<P: AsRef<Path>>(output_path: P, snapshot: &MapSnapshot) -> Result<()> {
    object_to_json(output_path, snapshot)
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Writes a plain text summary of the map.
pub fn write_report<P: AsRef<Path>>(output_path: P, store: &MapStore, fit: &PlaneFit) -> Result<()> {
    let mut s = String::new();
    s += format!("generated: {}\n\n", timestamp()).as_str();
    s += format!("frames: {}\n", store.frame_count()).as_str();
    s += format!("points: {}\n", store.point_count()).as_str();
    match store.mean_reprojection_error() {
        Some(err) => s += format!("mean reprojection error: {:.5} px\n", err).as_str(),
        None => s += "mean reprojection error: n/a\n",
    }
    if let Some(last) = store.last_frame() {
        let c = last.center();
        s += format!("last camera center: [{:.4}, {:.4}, {:.4}]\n", c.x, c.y, c.z).as_str();
        let k = last.camera().matrix();
        s += "intrinsics:\n";
        for r in 0..3 {
            s += format!("  [{:.4}, {:.4}, {:.4}]\n", k[(r, 0)], k[(r, 1)], k[(r, 2)]).as_str();
        }
    }
    match &fit.plane {
        Some(plane) => {
            let [nx, ny, nz, d] = plane.coefficients();
            s += format!(
                "plane: [{:.5}, {:.5}, {:.5}, {:.5}] with {} inliers\n",
                nx,
                ny,
                nz,
                d,
                fit.inliers.len()
            )
            .as_str();
        }
        None => s += "plane: none\n",
    }
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(s.as_bytes())?;
    Ok(())
}
