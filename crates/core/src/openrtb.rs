//! OpenRTB 2.6 compatible bid request/response types.
//! Subset of fields exchanged with in-app header-bidding demand sources,
//! plus the helpers the auction uses to pick and decorate a winning bid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OpenRTB Bid Request (simplified, app inventory only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRequest {
    pub id: String,
    pub imp: Vec<Impression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(default)]
    pub tmax: u32,
    #[serde(default)]
    pub cur: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impression {
    pub id: String,
    /// Placement identifier understood by the demand source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(default)]
    pub instl: u8,
    #[serde(default)]
    pub bidfloor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Banner {
    #[serde(default)]
    pub format: Vec<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct App {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// OpenRTB Bid Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidResponse {
    pub id: String,
    #[serde(default)]
    pub seatbid: Vec<SeatBid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidid: Option<String>,
    #[serde(default = "default_cur")]
    pub cur: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

fn default_cur() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatBid {
    pub bid: Vec<Bid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub impid: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crid: Option<String>,
    #[serde(default)]
    pub w: u32,
    #[serde(default)]
    pub h: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

const OWNED_OPERATED_KEY: &str = "oo";

impl BidResponse {
    /// Create an empty response for the given request ID.
    pub fn no_bid(request_id: String) -> Self {
        Self {
            id: request_id,
            seatbid: Vec::new(),
            bidid: None,
            cur: default_cur(),
            ext: None,
        }
    }

    pub fn has_bids(&self) -> bool {
        self.seatbid.iter().any(|s| !s.bid.is_empty())
    }

    /// Highest-priced bid across all seats. The first one seen wins a tie.
    pub fn winning_bid(&self) -> Option<&Bid> {
        let mut winner: Option<&Bid> = None;
        for bid in self.seatbid.iter().flat_map(|s| s.bid.iter()) {
            let replace = match winner {
                Some(current) => bid.price > current.price,
                None => true,
            };
            if replace {
                winner = Some(bid);
            }
        }
        winner
    }

    pub fn winning_bid_mut(&mut self) -> Option<&mut Bid> {
        let mut winner: Option<&mut Bid> = None;
        for bid in self.seatbid.iter_mut().flat_map(|s| s.bid.iter_mut()) {
            let replace = match &winner {
                Some(current) => bid.price > current.price,
                None => true,
            };
            if replace {
                winner = Some(bid);
            }
        }
        winner
    }

    /// Price of the winning bid, `0.0` when there is none.
    pub fn winning_price(&self) -> f64 {
        self.winning_bid().map(|b| b.price).unwrap_or(0.0)
    }
}

impl Bid {
    /// Whether the bid is flagged as owned-and-operated demand under
    /// `ext.<namespace>.oo`. Accepts `true` or any non-zero number.
    pub fn is_owned_operated(&self, namespace: &str) -> bool {
        let raw = self
            .ext
            .as_ref()
            .and_then(|ext| ext.get(namespace))
            .and_then(|ns| ns.get(OWNED_OPERATED_KEY));

        match raw {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().map(|v| v as i64 != 0).unwrap_or(false),
            _ => false,
        }
    }

    /// Write the standard header-bidding targeting keys (plain and
    /// bidder-suffixed) into `ext.prebid.targeting`.
    pub fn apply_targeting(&mut self, bidder_code: &str) {
        let size = format!("{}x{}", self.w, self.h);
        let price = self.price.to_string();
        let pairs = [
            ("hb_env", "mobile-app".to_string()),
            ("hb_size", size),
            ("hb_bidder", bidder_code.to_string()),
            ("hb_pb", price),
        ];

        let targeting = self.prebid_section("targeting");
        for (key, value) in pairs {
            targeting.insert(format!("{key}_{bidder_code}"), Value::String(value.clone()));
            targeting.insert(key.to_string(), Value::String(value));
        }
    }

    /// Stamp the renderer that should paint this bid into `ext.prebid.meta`.
    pub fn apply_renderer_meta(&mut self, name: &str, version: &str) {
        let meta = self.prebid_section("meta");
        meta.insert("rendererName".to_string(), Value::String(name.to_string()));
        meta.insert(
            "rendererVersion".to_string(),
            Value::String(version.to_string()),
        );
    }

    pub fn targeting(&self, key: &str) -> Option<&str> {
        self.ext
            .as_ref()?
            .get("prebid")?
            .get("targeting")?
            .get(key)?
            .as_str()
    }

    /// Returns `ext.prebid.<section>`, replacing any non-object value on the way.
    fn prebid_section(&mut self, section: &str) -> &mut Map<String, Value> {
        let ext = self.ext.get_or_insert_with(|| Value::Object(Map::new()));
        let prebid = ensure_object(ext).entry("prebid").or_insert(Value::Null);
        let section = ensure_object(prebid)
            .entry(section.to_string())
            .or_insert(Value::Null);
        ensure_object(section)
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
