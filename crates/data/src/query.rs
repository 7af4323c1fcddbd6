//! Static per-intent query definitions
//!
//! The table never changes at runtime. Path parameters in the endpoint
//! template are substituted from entities by the gateway; the response
//! mapping renames backend field names to the canonical ones templates use.

use callflow_core::QueryMethod;

/// How an intent's data is fetched and reshaped
#[derive(Debug, Clone, Copy)]
pub struct QueryDefinition {
    pub intent: &'static str,
    pub method: QueryMethod,
    /// Endpoint path with `{param}` placeholders
    pub endpoint_template: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    /// (backend field, canonical field) rename pairs
    pub response_mapping: &'static [(&'static str, &'static str)],
}

const DEFINITIONS: &[QueryDefinition] = &[
    QueryDefinition {
        intent: "appointment_booking",
        method: QueryMethod::Post,
        endpoint_template: "/appointments",
        required_params: &["date", "time", "service_type"],
        optional_params: &["name", "phone_number"],
        response_mapping: &[
            ("appointment_id", "reference"),
            ("scheduled_at", "when"),
            ("practitioner", "provider_name"),
        ],
    },
    QueryDefinition {
        intent: "shipment_inquiry",
        method: QueryMethod::Get,
        endpoint_template: "/shipments/{tracking_id}",
        required_params: &["tracking_id"],
        optional_params: &[],
        response_mapping: &[
            ("current_status", "status"),
            ("estimated_delivery", "eta"),
            ("last_location", "location"),
        ],
    },
    QueryDefinition {
        intent: "account_balance",
        method: QueryMethod::Get,
        endpoint_template: "/accounts/{account_id}/balance",
        required_params: &["account_id"],
        optional_params: &[],
        response_mapping: &[("current_balance", "balance"), ("currency_code", "currency")],
    },
    QueryDefinition {
        intent: "general_inquiry",
        method: QueryMethod::Get,
        endpoint_template: "/search",
        required_params: &[],
        optional_params: &["query"],
        response_mapping: &[("result_text", "answer")],
    },
];

/// Look up the definition for an intent
pub fn definition_for(intent: &str) -> Option<&'static QueryDefinition> {
    DEFINITIONS.iter().find(|d| d.intent == intent)
}

/// Every intent with a query definition
pub fn queryable_intents() -> Vec<&'static str> {
    DEFINITIONS.iter().map(|d| d.intent).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_intent() {
        let def = definition_for("shipment_inquiry").unwrap();
        assert_eq!(def.method, QueryMethod::Get);
        assert_eq!(def.required_params, &["tracking_id"]);
        assert!(def.endpoint_template.contains("{tracking_id}"));
    }

    #[test]
    fn test_lookup_unknown_intent() {
        assert!(definition_for("greeting").is_none());
    }

    #[test]
    fn test_path_placeholders_are_required_params() {
        // a placeholder with no required param would produce a broken URL
        for def in DEFINITIONS {
            let mut rest = def.endpoint_template;
            while let Some(start) = rest.find('{') {
                let end = rest[start..].find('}').map(|i| start + i).unwrap();
                let name = &rest[start + 1..end];
                assert!(
                    def.required_params.contains(&name),
                    "{} placeholder {name} not required",
                    def.intent
                );
                rest = &rest[end + 1..];
            }
        }
    }
}
