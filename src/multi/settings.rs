//! Routing for resources that devices identify by name rather than by
//! channel. The aggregate lists them as `name[device]` and expects the same
//! form back on every read or write.

use anyhow::Result;

use super::device::MultiDevice;
use super::names::{decode, encode};
use crate::error::AggregateError;
use crate::hal::traits::Device;
use crate::hal::types::ArgInfo;

impl MultiDevice {
    /// Every device's names, each tagged with its device index
    pub(super) fn list_encoded(&self, list: impl Fn(&dyn Device) -> Vec<String>) -> Vec<String> {
        self.devices
            .iter()
            .enumerate()
            .flat_map(|(index, device)| {
                list(device.as_ref())
                    .into_iter()
                    .map(move |name| encode(&name, index))
            })
            .collect()
    }

    /// Decode `name[device]` and run `f` on that device with the bare name
    pub(super) fn route_named<T>(
        &self,
        encoded: &str,
        f: impl FnOnce(&dyn Device, &str) -> Result<T>,
    ) -> Result<T> {
        let (name, index) = decode(encoded)?;
        let device = self
            .devices
            .get(index)
            .ok_or_else(|| AggregateError::out_of_range("device", index, self.devices.len()))?;
        f(device.as_ref(), &name)
    }

    /// Setting descriptions of every device with their keys encoded
    pub(super) fn encoded_setting_info(&self) -> Vec<ArgInfo> {
        self.devices
            .iter()
            .enumerate()
            .flat_map(|(index, device)| {
                device.setting_info().into_iter().map(move |mut info| {
                    info.key = encode(&info.key, index);
                    info
                })
            })
            .collect()
    }
}
