//! Ad slot configuration handed to bidders.
//!
//! Owned by the rendering pipeline and immutable for the lifetime of a
//! request; bidders only read it (it is shared behind an `Arc`).

use crate::error::{HbError, HbResult};
use crate::openrtb::{App, Banner, BidRequest, Format, Impression};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    Banner,
    Interstitial,
    Native,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

impl AdSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfiguration {
    /// Placement identifier, sent to demand sources as the impression `tagid`.
    pub config_id: String,
    pub ad_format: AdFormat,
    #[serde(default)]
    pub sizes: Vec<AdSize>,
    #[serde(default)]
    pub targeting: BTreeMap<String, String>,
    #[serde(default)]
    pub app_bundle: Option<String>,
    #[serde(default)]
    pub ext: Option<serde_json::Value>,
}

impl SlotConfiguration {
    pub fn banner(config_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            config_id: config_id.into(),
            ad_format: AdFormat::Banner,
            sizes: vec![AdSize::new(width, height)],
            targeting: BTreeMap::new(),
            app_bundle: None,
            ext: None,
        }
    }

    pub fn interstitial(config_id: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            ad_format: AdFormat::Interstitial,
            sizes: Vec::new(),
            targeting: BTreeMap::new(),
            app_bundle: None,
            ext: None,
        }
    }

    pub fn with_targeting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.targeting.insert(key.into(), value.into());
        self
    }

    /// Check that the slot is fully populated before any bidder sees it.
    pub fn validate(&self) -> HbResult<()> {
        if self.config_id.trim().is_empty() {
            return Err(HbError::InvalidSlot("config_id is empty".to_string()));
        }
        if self.ad_format == AdFormat::Banner && self.sizes.is_empty() {
            return Err(HbError::InvalidSlot(format!(
                "banner slot {} has no sizes",
                self.config_id
            )));
        }
        if let Some(size) = self.sizes.iter().find(|s| s.width == 0 || s.height == 0) {
            return Err(HbError::InvalidSlot(format!(
                "slot {} has a zero dimension: {}x{}",
                self.config_id, size.width, size.height
            )));
        }
        Ok(())
    }

    /// Build a single-impression OpenRTB request for this slot.
    pub fn to_openrtb_request(&self, request_id: &str, tmax_ms: u32) -> BidRequest {
        let banner = match self.ad_format {
            AdFormat::Banner | AdFormat::Interstitial if !self.sizes.is_empty() => Some(Banner {
                format: self
                    .sizes
                    .iter()
                    .map(|s| Format {
                        w: s.width,
                        h: s.height,
                    })
                    .collect(),
            }),
            _ => None,
        };

        let ext = if self.targeting.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "targeting": self.targeting }))
        };

        BidRequest {
            id: request_id.to_string(),
            imp: vec![Impression {
                id: "1".to_string(),
                tagid: Some(self.config_id.clone()),
                banner,
                instl: u8::from(self.ad_format == AdFormat::Interstitial),
                bidfloor: 0.0,
                ext,
            }],
            app: self.app_bundle.as_ref().map(|bundle| App {
                bundle: Some(bundle.clone()),
                name: None,
            }),
            tmax: tmax_ms,
            cur: vec!["USD".to_string()],
            ext: self.ext.clone(),
        }
    }
}
