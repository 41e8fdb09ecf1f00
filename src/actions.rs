//! Classification of inbound REST requests into typed DNS actions.
use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Collection root used by the upstream DNS API.
pub const ZONE_COLLECTION_ROOT: &str = "/dnszone";

/// Every operation a caller can ask the proxy to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ListZones,
    GetZone,
    CreateZone,
    UpdateZone,
    CheckAvailability,
    ListRecords,
    AddRecord,
    UpdateRecord,
    DeleteRecord,
    ImportRecords,
    ExportRecords,
    EnableDnssec,
    DisableDnssec,
    IssueCertificate,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::ListZones,
        Action::GetZone,
        Action::CreateZone,
        Action::UpdateZone,
        Action::CheckAvailability,
        Action::ListRecords,
        Action::AddRecord,
        Action::UpdateRecord,
        Action::DeleteRecord,
        Action::ImportRecords,
        Action::ExportRecords,
        Action::EnableDnssec,
        Action::DisableDnssec,
        Action::IssueCertificate,
    ];

    /// Stable name stored in permission rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::ListZones => "list_zones",
            Action::GetZone => "get_zone",
            Action::CreateZone => "create_zone",
            Action::UpdateZone => "update_zone",
            Action::CheckAvailability => "check_availability",
            Action::ListRecords => "list_records",
            Action::AddRecord => "add_record",
            Action::UpdateRecord => "update_record",
            Action::DeleteRecord => "delete_record",
            Action::ImportRecords => "import_records",
            Action::ExportRecords => "export_records",
            Action::EnableDnssec => "enable_dnssec",
            Action::DisableDnssec => "disable_dnssec",
            Action::IssueCertificate => "issue_certificate",
        }
    }

    /// Actions that carry a record type decoded from the request body.
    pub fn is_record_mutating(self) -> bool {
        matches!(self, Action::AddRecord | Action::UpdateRecord)
    }

    /// Actions that change zone-level state and are reserved for admin identities.
    pub fn requires_admin(self) -> bool {
        matches!(self, Action::CreateZone | Action::UpdateZone)
    }

    /// Actions whose route carries no zone id.
    pub fn is_zoneless(self) -> bool {
        matches!(
            self,
            Action::ListZones | Action::CreateZone | Action::CheckAvailability
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// DNS record types understood by the upstream API, keyed by wire code.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    MX,
    SPF,
    Flatten,
    PullZone,
    SRV,
    CAA,
    PTR,
    Script,
    NS,
}

impl RecordType {
    pub const ALL: [RecordType; 13] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::TXT,
        RecordType::MX,
        RecordType::SPF,
        RecordType::Flatten,
        RecordType::PullZone,
        RecordType::SRV,
        RecordType::CAA,
        RecordType::PTR,
        RecordType::Script,
        RecordType::NS,
    ];

    /// Decode the upstream integer code. Unknown codes are never aliased.
    pub fn from_code(code: i64) -> Option<RecordType> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| RecordType::ALL.get(idx).copied())
    }

    pub fn code(self) -> i64 {
        match self {
            RecordType::A => 0,
            RecordType::AAAA => 1,
            RecordType::CNAME => 2,
            RecordType::TXT => 3,
            RecordType::MX => 4,
            RecordType::SPF => 5,
            RecordType::Flatten => 6,
            RecordType::PullZone => 7,
            RecordType::SRV => 8,
            RecordType::CAA => 9,
            RecordType::PTR => 10,
            RecordType::Script => 11,
            RecordType::NS => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
            RecordType::MX => "MX",
            RecordType::SPF => "SPF",
            RecordType::Flatten => "Flatten",
            RecordType::PullZone => "PullZone",
            RecordType::SRV => "SRV",
            RecordType::CAA => "CAA",
            RecordType::PTR => "PTR",
            RecordType::Script => "Script",
            RecordType::NS => "NS",
        }
    }

    pub fn from_name(name: &str) -> Option<RecordType> {
        RecordType::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a wire-level record type code to its name, or `""` when unknown.
pub fn map_record_type_to_string(code: i64) -> &'static str {
    RecordType::from_code(code).map_or("", RecordType::as_str)
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRequest {
    pub action: Action,
    /// 0 for zone-less actions.
    pub zone_id: i64,
    /// Only set for record-mutating actions with a known type code.
    pub record_type: Option<RecordType>,
}

impl ParsedRequest {
    fn new(action: Action, zone_id: i64) -> Self {
        Self {
            action,
            zone_id,
            record_type: None,
        }
    }

    /// Record type name as compared against permission rows (`""` when unknown).
    pub fn record_type_name(&self) -> &'static str {
        self.record_type.map_or("", RecordType::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported method for path: {method} {path}")]
    UnsupportedRoute { method: String, path: String },

    #[error("invalid zone id '{0}'")]
    InvalidZoneId(String),

    #[error("failed to parse request body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

impl ParseError {
    /// Routing errors are distinct from body decode errors.
    pub fn is_routing(&self) -> bool {
        !matches!(self, ParseError::MalformedBody(_))
    }
}

lazy_static::lazy_static! {
    static ref CHECK_AVAILABILITY_RE: Regex = Regex::new(r"^/checkavailability/?$").unwrap();
    /// `/{zone}` optionally followed by one of the zone sub-resources.
    static ref ZONE_PATH_RE: Regex = Regex::new(
        r"^/(\d+)(/records(?:/(\d+))?|/export|/import|/dnssec|/certificate/issue)?/?$"
    )
    .unwrap();
}

#[derive(Debug, Deserialize)]
struct RecordPayload {
    #[serde(rename = "Type", default)]
    record_type: Option<i64>,
}

/// Route table over a configurable zone collection root.
#[derive(Debug, Clone)]
pub struct ActionParser {
    root: String,
}

impl Default for ActionParser {
    fn default() -> Self {
        Self::new(ZONE_COLLECTION_ROOT)
    }
}

impl ActionParser {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Classify a request. The body is only read, never consumed.
    pub fn parse(
        &self,
        method: &Method,
        path: &str,
        body: &[u8],
    ) -> Result<ParsedRequest, ParseError> {
        let unsupported = || ParseError::UnsupportedRoute {
            method: method.to_string(),
            path: path.to_string(),
        };

        let rest = path.strip_prefix(self.root.as_str()).ok_or_else(unsupported)?;

        if rest.is_empty() || rest == "/" {
            return match method {
                &Method::GET => Ok(ParsedRequest::new(Action::ListZones, 0)),
                &Method::POST => Ok(ParsedRequest::new(Action::CreateZone, 0)),
                _ => Err(unsupported()),
            };
        }

        if CHECK_AVAILABILITY_RE.is_match(rest) {
            return match method {
                &Method::POST => Ok(ParsedRequest::new(Action::CheckAvailability, 0)),
                _ => Err(unsupported()),
            };
        }

        let caps = ZONE_PATH_RE.captures(rest).ok_or_else(unsupported)?;
        let zone_id: i64 = caps[1]
            .parse()
            .map_err(|_| ParseError::InvalidZoneId(caps[1].to_string()))?;
        let sub = caps.get(2).map_or("", |m| m.as_str());
        let has_record_id = caps.get(3).is_some();

        let action = match (method, sub) {
            (&Method::GET, "") => Action::GetZone,
            (&Method::POST, "") => Action::UpdateZone,
            (&Method::GET, "/records") => Action::ListRecords,
            (&Method::POST, "/records") => Action::AddRecord,
            (&Method::POST, _) if has_record_id => Action::UpdateRecord,
            (&Method::DELETE, _) if has_record_id => Action::DeleteRecord,
            (&Method::GET, "/export") => Action::ExportRecords,
            (&Method::POST, "/import") => Action::ImportRecords,
            (&Method::POST, "/dnssec") => Action::EnableDnssec,
            (&Method::DELETE, "/dnssec") => Action::DisableDnssec,
            (&Method::POST, "/certificate/issue") => Action::IssueCertificate,
            _ => return Err(unsupported()),
        };

        let mut parsed = ParsedRequest::new(action, zone_id);
        if action.is_record_mutating() {
            let payload: RecordPayload =
                serde_json::from_slice(body).map_err(ParseError::MalformedBody)?;
            parsed.record_type = payload.record_type.and_then(RecordType::from_code);
        }
        Ok(parsed)
    }
}

/// Parse against the default `/dnszone` root.
pub fn parse_request(
    method: &Method,
    path: &str,
    body: &[u8],
) -> Result<ParsedRequest, ParseError> {
    ActionParser::default().parse(method, path, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(method: Method, path: &str, body: &str) -> Result<ParsedRequest, ParseError> {
        parse_request(&method, path, body.as_bytes())
    }

    #[test]
    fn route_table_yields_documented_actions() {
        #[rustfmt::skip]
        let cases: &[(Method, &str, &str, Action, i64, Option<RecordType>)] = &[
            (Method::GET, "/dnszone", "", Action::ListZones, 0, None),
            (Method::GET, "/dnszone/", "", Action::ListZones, 0, None),
            (Method::POST, "/dnszone", r#"{"Domain":"example.com"}"#, Action::CreateZone, 0, None),
            (Method::POST, "/dnszone/checkavailability", r#"{"Name":"example.com"}"#, Action::CheckAvailability, 0, None),
            (Method::GET, "/dnszone/123", "", Action::GetZone, 123, None),
            (Method::POST, "/dnszone/123", r#"{"SoaEmail":"a@b.c"}"#, Action::UpdateZone, 123, None),
            (Method::GET, "/dnszone/456/records", "", Action::ListRecords, 456, None),
            (Method::POST, "/dnszone/789/records", r#"{"Type":3,"Name":"t","Value":"v"}"#, Action::AddRecord, 789, Some(RecordType::TXT)),
            (Method::POST, "/dnszone/789/records/456", r#"{"Type":0,"Name":"www","Value":"1.2.3.4"}"#, Action::UpdateRecord, 789, Some(RecordType::A)),
            (Method::DELETE, "/dnszone/123/records/456", "", Action::DeleteRecord, 123, None),
            (Method::GET, "/dnszone/123/export", "", Action::ExportRecords, 123, None),
            (Method::GET, "/dnszone/456/export/", "", Action::ExportRecords, 456, None),
            (Method::POST, "/dnszone/123/import", "@ 300 IN A 192.168.1.1", Action::ImportRecords, 123, None),
            (Method::POST, "/dnszone/123/dnssec", "", Action::EnableDnssec, 123, None),
            (Method::DELETE, "/dnszone/123/dnssec", "", Action::DisableDnssec, 123, None),
            (Method::POST, "/dnszone/123/certificate/issue", r#"{"Domain":"*.example.com"}"#, Action::IssueCertificate, 123, None),
        ];

        for (method, path, body, action, zone_id, record_type) in cases {
            let got = parse(method.clone(), path, body)
                .unwrap_or_else(|e| panic!("{method} {path}: {e}"));
            assert_eq!(got.action, *action, "{method} {path}");
            assert_eq!(got.zone_id, *zone_id, "{method} {path}");
            assert_eq!(got.record_type, *record_type, "{method} {path}");
        }
    }

    #[test]
    fn routes_outside_table_are_rejected() {
        let cases: &[(Method, &str)] = &[
            (Method::PUT, "/dnszone/123"),
            (Method::DELETE, "/dnszone"),
            (Method::GET, "/invalid"),
            (Method::GET, "/dnszonex"),
            (Method::GET, "/dnszone/abc"),
            (Method::GET, "/dnszone/abc/records"),
            (Method::GET, "/dnszone/checkavailability"),
            (Method::PUT, "/dnszone/123/records/4"),
            (Method::GET, "/dnszone/123/records/4"),
            (Method::GET, "/dnszone/123/dnssec"),
            (Method::GET, "/dnszone/123/certificate"),
            (Method::PATCH, "/dnszone/123/import"),
            (Method::GET, "/dnszone/1/records/2/extra"),
        ];

        for (method, path) in cases {
            let err = parse(method.clone(), path, "").expect_err(path);
            assert!(err.is_routing(), "{method} {path}: {err}");
            assert!(err.to_string().contains("unsupported method for path"));
        }
    }

    #[test]
    fn oversized_zone_id_is_a_routing_error() {
        let err = parse(Method::GET, "/dnszone/99999999999999999999999", "").unwrap_err();
        assert!(matches!(err, ParseError::InvalidZoneId(_)));
        assert!(err.is_routing());
    }

    #[test]
    fn malformed_record_body_is_a_decode_error() {
        let err = parse(Method::POST, "/dnszone/123/records", "{invalid json").unwrap_err();
        assert!(matches!(err, ParseError::MalformedBody(_)));
        assert!(!err.is_routing());
        assert!(err.to_string().contains("failed to parse request body"));

        let err = parse(Method::POST, "/dnszone/123/records", "").unwrap_err();
        assert!(matches!(err, ParseError::MalformedBody(_)));
    }

    #[test]
    fn non_record_bodies_are_not_decoded() {
        let got = parse(Method::POST, "/dnszone/5/import", "not json at all").unwrap();
        assert_eq!(got.action, Action::ImportRecords);
        assert_eq!(got.record_type, None);
    }

    #[test]
    fn missing_or_unknown_type_code_yields_no_record_type() {
        let got = parse(Method::POST, "/dnszone/1/records", r#"{"Name":"x"}"#).unwrap();
        assert_eq!(got.record_type, None);
        assert_eq!(got.record_type_name(), "");

        let got = parse(Method::POST, "/dnszone/1/records", r#"{"Type":42}"#).unwrap();
        assert_eq!(got.record_type, None);
    }

    #[test]
    fn parsing_leaves_the_body_untouched() {
        let body = br#"{"Type":0,"Name":"www","Value":"1.2.3.4"}"#.to_vec();
        let copy = body.clone();
        parse_request(&Method::POST, "/dnszone/123/records", &body).unwrap();
        assert_eq!(body, copy);
    }

    #[test]
    fn custom_root_is_honoured() {
        let parser = ActionParser::new("/zones/");
        let got = parser.parse(&Method::GET, "/zones/456/records", b"").unwrap();
        assert_eq!(got.action, Action::ListRecords);
        assert_eq!(got.zone_id, 456);
        assert!(parser.parse(&Method::GET, "/dnszone/456", b"").is_err());
    }

    #[test]
    fn record_type_mapping_is_total() {
        let expected = [
            "A", "AAAA", "CNAME", "TXT", "MX", "SPF", "Flatten", "PullZone", "SRV", "CAA", "PTR",
            "Script", "NS",
        ];
        for (code, name) in expected.iter().enumerate() {
            assert_eq!(map_record_type_to_string(code as i64), *name);
        }
        for code in [13, -1, 999, i64::MIN, i64::MAX] {
            assert_eq!(map_record_type_to_string(code), "");
        }
    }

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("drop_everything".parse::<Action>().is_err());
    }
}
