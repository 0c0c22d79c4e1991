//! Required metric subsets per kind of device.
//!
//! Metrics are open-ended, but each device class names the metrics a reading
//! must carry to be admitted. Built-in classes:
//!
//! - `environment`: temperature, humidity, light
//! - `beehive`: temperature, humidity, sound, battery

use anyhow::{bail, Result};
use std::collections::BTreeMap;

use crate::error::ValidationError;

pub const ENVIRONMENT_CLASS: &str = "environment";
pub const BEEHIVE_CLASS: &str = "beehive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClass {
    pub name: String,
    pub required: Vec<String>,
}

impl DeviceClass {
    pub fn new(name: impl Into<String>, required: &[&str]) -> Self {
        Self {
            name: name.into(),
            required: required.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceClasses {
    classes: BTreeMap<String, DeviceClass>,
    default_class: String,
}

impl Default for DeviceClasses {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeviceClasses {
    pub fn builtin() -> Self {
        let classes = [
            DeviceClass::new(ENVIRONMENT_CLASS, &["temperature", "humidity", "light"]),
            DeviceClass::new(BEEHIVE_CLASS, &["temperature", "humidity", "sound", "battery"]),
        ];
        Self {
            classes: classes.into_iter().map(|c| (c.name.clone(), c)).collect(),
            default_class: ENVIRONMENT_CLASS.to_string(),
        }
    }

    pub fn new(classes: Vec<DeviceClass>, default_class: &str) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for class in classes {
            if class.required.is_empty() {
                bail!("device class {:?} must require at least one metric", class.name);
            }
            if by_name.insert(class.name.clone(), class).is_some() {
                bail!("device class defined twice");
            }
        }
        if !by_name.contains_key(default_class) {
            bail!("default device class {default_class:?} is not defined");
        }
        Ok(Self {
            classes: by_name,
            default_class: default_class.to_string(),
        })
    }

    /// Parses `name=metric,metric;name=metric` definitions.
    pub fn parse_definitions(raw: &str) -> Result<Vec<DeviceClass>> {
        let mut classes = Vec::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((name, metrics)) = entry.split_once('=') else {
                bail!("device class entry {entry:?} must look like name=metric,metric");
            };
            let name = name.trim();
            if name.is_empty() {
                bail!("device class entry {entry:?} has an empty name");
            }
            let required: Vec<String> = metrics
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            classes.push(DeviceClass {
                name: name.to_string(),
                required,
            });
        }
        Ok(classes)
    }

    pub fn default_class(&self) -> &DeviceClass {
        &self.classes[&self.default_class]
    }

    /// Class named by a payload, or the default when it names none.
    pub fn resolve(&self, name: Option<&str>) -> Result<&DeviceClass, ValidationError> {
        match name {
            None => Ok(self.default_class()),
            Some(name) => self
                .classes
                .get(name)
                .ok_or_else(|| ValidationError::UnknownDeviceClass(name.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn into_classes(self) -> Vec<DeviceClass> {
        self.classes.into_values().collect()
    }
}
