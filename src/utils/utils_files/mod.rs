use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::utils::utils_errors::TrajoptError;

/// Serialization formats understood by `FileUtils`.  When saving or loading from a file, the
/// format is picked from the file extension (`json`, `toml`, or `ron`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SerializationFormat {
    Json,
    Toml,
    Ron
}
impl SerializationFormat {
    pub fn from_path(p: &Path) -> Result<Self, TrajoptError> {
        let ext = FileUtils::get_file_extension_string(p);
        return match ext.as_deref() {
            Some("json") => { Ok(Self::Json) }
            Some("toml") => { Ok(Self::Toml) }
            Some("ron") => { Ok(Self::Ron) }
            _ => { Err(TrajoptError::new_generic_error_str(&format!("unsupported file extension for path {:?}.", p), file!(), line!())) }
        }
    }
}

/// Convenience struct that holds many class functions related to file utils.
pub struct FileUtils;
impl FileUtils {
    /// Reads contents of file and outputs it to a string.
    pub fn read_file_contents_to_string(p: &Path) -> Result<String, TrajoptError> {
        let mut f = File::open(p).map_err(|e| TrajoptError::new_generic_error_str(&e.to_string(), file!(), line!()))?;
        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| TrajoptError::new_generic_error_str(&e.to_string(), file!(), line!()))?;
        Ok(contents)
    }
    /// Returns file extension of path as string.
    pub fn get_file_extension_string(p: &Path) -> Option<String> {
        return match p.extension() {
            None => { None }
            Some(o) => { o.to_str().map(|s| s.to_lowercase()) }
        }
    }
    pub fn object_to_string<T: Serialize>(object: &T, format: &SerializationFormat) -> Result<String, TrajoptError> {
        let res = match format {
            SerializationFormat::Json => { serde_json::to_string_pretty(object).map_err(|e| e.to_string()) }
            SerializationFormat::Toml => { toml::to_string(object).map_err(|e| e.to_string()) }
            SerializationFormat::Ron => { ron::ser::to_string_pretty(object, ron::ser::PrettyConfig::default()).map_err(|e| e.to_string()) }
        };
        return res.map_err(|e| TrajoptError::new_generic_error_str(&format!("could not serialize object as {:?}: {}", format, e), file!(), line!()));
    }
    pub fn load_object_from_string<T: DeserializeOwned>(s: &str, format: &SerializationFormat) -> Result<T, TrajoptError> {
        let res = match format {
            SerializationFormat::Json => { serde_json::from_str(s).map_err(|e| e.to_string()) }
            SerializationFormat::Toml => { toml::from_str(s).map_err(|e| e.to_string()) }
            SerializationFormat::Ron => { ron::from_str(s).map_err(|e| e.to_string()) }
        };
        return res.map_err(|e| TrajoptError::new_generic_error_str(&format!("the given {:?} string is incompatible with the requested type: {}", format, e), file!(), line!()));
    }
    pub fn load_object_from_json_string<T: DeserializeOwned>(json_str: &str) -> Result<T, TrajoptError> {
        Self::load_object_from_string(json_str, &SerializationFormat::Json)
    }
    /// Saves given object to a file.  The format is chosen from the file extension.
    pub fn save_object_to_file<T: Serialize>(object: &T, p: &Path) -> Result<(), TrajoptError> {
        let format = SerializationFormat::from_path(p)?;
        let s = Self::object_to_string(object, &format)?;

        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TrajoptError::new_generic_error_str(&e.to_string(), file!(), line!()))?;
            }
        }

        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(p)
            .map_err(|e| TrajoptError::new_generic_error_str(&e.to_string(), file!(), line!()))?;
        f.write_all(s.as_bytes()).map_err(|e| TrajoptError::new_generic_error_str(&e.to_string(), file!(), line!()))?;
        Ok(())
    }
    /// Reads object that was serialized as json, toml, or ron from a file.
    /// ## Example
    /// ```
    /// use std::path::Path;
    /// use trajopt::utils::utils_files::FileUtils;
    /// use trajopt::optimization::OptimizerParameters;
    ///
    /// let res = FileUtils::load_object_from_file::<OptimizerParameters>(Path::new("does_not_exist.toml"));
    /// assert!(res.is_err());
    /// ```
    pub fn load_object_from_file<T: DeserializeOwned>(p: &Path) -> Result<T, TrajoptError> {
        let format = SerializationFormat::from_path(p)?;
        let contents = Self::read_file_contents_to_string(p)?;
        Self::load_object_from_string(&contents, &format)
    }
}

/// Implemented by config-like structs so they can be saved and loaded in any supported format.
pub trait SaveAndLoadable: Serialize + DeserializeOwned {
    fn to_string_with_format(&self, format: &SerializationFormat) -> Result<String, TrajoptError> {
        FileUtils::object_to_string(self, format)
    }
    fn load_from_string_with_format(s: &str, format: &SerializationFormat) -> Result<Self, TrajoptError> {
        FileUtils::load_object_from_string(s, format)
    }
    fn save_to_path(&self, p: &Path) -> Result<(), TrajoptError> {
        FileUtils::save_object_to_file(self, p)
    }
    fn load_from_path(p: &Path) -> Result<Self, TrajoptError> {
        FileUtils::load_object_from_file(p)
    }
}
impl<T> SaveAndLoadable for T where T: Serialize + DeserializeOwned { }

pub fn temp_file_path(file_name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push("trajopt");
    p.push(file_name);
    p
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Hyper {
        horizon: usize,
        dt: f64,
        name: String
    }

    #[test]
    fn format_is_picked_from_extension() {
        assert_eq!(SerializationFormat::from_path(Path::new("a/b.json")).unwrap(), SerializationFormat::Json);
        assert_eq!(SerializationFormat::from_path(Path::new("a/b.TOML")).unwrap(), SerializationFormat::Toml);
        assert_eq!(SerializationFormat::from_path(Path::new("b.ron")).unwrap(), SerializationFormat::Ron);
        assert!(SerializationFormat::from_path(Path::new("b.yaml")).is_err());
    }

    #[test]
    fn strings_load_back_in_every_format() {
        let h = Hyper { horizon: 10, dt: 0.01, name: "ur5".to_string() };
        for format in [SerializationFormat::Json, SerializationFormat::Toml, SerializationFormat::Ron] {
            let s = h.to_string_with_format(&format).unwrap();
            let back = Hyper::load_from_string_with_format(&s, &format).unwrap();
            assert_eq!(h, back);
        }
    }

    #[test]
    fn file_save_and_load() {
        let h = Hyper { horizon: 3, dt: 0.1, name: "pendulum".to_string() };
        let p = temp_file_path("utils_files_test_hyper.toml");
        h.save_to_path(&p).unwrap();
        let back = Hyper::load_from_path(&p).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn bad_string_is_an_error() {
        let res = FileUtils::load_object_from_json_string::<Hyper>("{\"horizon\": \"ten\"}");
        assert!(res.is_err());
    }
}
