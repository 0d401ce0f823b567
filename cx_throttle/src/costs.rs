//! Per-endpoint request costs
//!
//! Exchanges bill heavier endpoints more than one unit of their rate-limit
//! budget, sometimes depending on the requested page size (`limit`). An
//! [`EndpointCosts`] table maps an endpoint key such as `"GET /api/v3/depth"`
//! to the cost a caller should pass to `Throttler::throttle`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::DEFAULT_COST;
use crate::error::Result;
use crate::error::ThrottleError;

/// How the cost of one endpoint is computed
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCostRule")]
pub enum CostRule {
    /// Same cost for every call
    Fixed(f64),

    /// Cost chosen by the `limit` parameter
    ///
    /// Tiers are `(max_limit, cost)` sorted by `max_limit`. The first tier
    /// whose `max_limit >= limit` applies; limits above every tier use the
    /// last one. Calls without a limit cost `cost`.
    ByLimit { cost: f64, tiers: Vec<(u64, f64)> },
}

impl CostRule {
    /// Resolve the cost for a call with an optional `limit` parameter
    pub fn resolve(&self, limit: Option<u64>) -> f64 {
        match self {
            CostRule::Fixed(cost) => *cost,
            CostRule::ByLimit { cost, tiers } => match limit {
                None => *cost,
                Some(limit) => tiers.iter().find(|(max, _)| limit <= *max).or(tiers.last()).map_or(*cost, |(_, tier_cost)| *tier_cost),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        let costs: Vec<f64> = match self {
            CostRule::Fixed(cost) => vec![*cost],
            CostRule::ByLimit { cost, tiers } => std::iter::once(*cost).chain(tiers.iter().map(|(_, c)| *c)).collect(),
        };
        match costs.into_iter().find(|c| !c.is_finite() || *c < 0.0) {
            Some(bad) => Err(ThrottleError::InvalidCost(bad)),
            None => Ok(()),
        }
    }
}

/// Accepted file forms of a cost rule: `5`, `"0.5"`, or `{ cost = 5, by_limit = [[100, 5], [500, 25]] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCostRule {
    Number(f64),
    Text(String),
    Table {
        #[serde(default)]
        cost: Option<f64>,
        #[serde(default)]
        by_limit: Vec<(u64, f64)>,
    },
}

impl TryFrom<RawCostRule> for CostRule {
    type Error = ThrottleError;

    fn try_from(raw: RawCostRule) -> Result<Self> {
        let rule = match raw {
            RawCostRule::Number(cost) => CostRule::Fixed(cost),
            RawCostRule::Text(text) => CostRule::Fixed(parse_cost(&text)?),
            RawCostRule::Table { cost, by_limit } if by_limit.is_empty() => CostRule::Fixed(cost.unwrap_or(DEFAULT_COST)),
            RawCostRule::Table { cost, mut by_limit } => {
                by_limit.sort_by_key(|(max, _)| *max);
                CostRule::ByLimit { cost: cost.unwrap_or(DEFAULT_COST), tiers: by_limit }
            }
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// Parse a textual cost such as `"2.5"`
pub fn parse_cost(text: &str) -> Result<f64> {
    let cost: f64 = text.trim().parse().map_err(|_| ThrottleError::InvalidCost(f64::NAN))?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(ThrottleError::InvalidCost(cost));
    }
    Ok(cost)
}

/// Key of an endpoint in an [`EndpointCosts`] table
pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// Cost table for one exchange API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "EndpointCostsSettings")]
pub struct EndpointCosts {
    default_cost: f64,
    rules: HashMap<String, CostRule>,
}

impl EndpointCosts {
    /// Empty table where every endpoint costs `default_cost`
    pub fn new(default_cost: f64) -> Result<Self> {
        if !default_cost.is_finite() || default_cost < 0.0 {
            return Err(ThrottleError::InvalidCost(default_cost));
        }
        Ok(Self { default_cost, rules: HashMap::new() })
    }

    /// Table from known-valid constant rules
    pub(crate) fn from_static(default_cost: f64, rules: &[(&str, CostRule)]) -> Self {
        Self { default_cost, rules: rules.iter().map(|(key, rule)| ((*key).to_string(), rule.clone())).collect() }
    }

    /// Add a rule, builder style
    pub fn with_rule(mut self, key: impl Into<String>, rule: CostRule) -> Result<Self> {
        self.insert(key, rule)?;
        Ok(self)
    }

    /// Add or replace the rule for `key`
    pub fn insert(&mut self, key: impl Into<String>, rule: CostRule) -> Result<()> {
        rule.validate()?;
        let rule = match rule {
            CostRule::ByLimit { cost, mut tiers } => {
                tiers.sort_by_key(|(max, _)| *max);
                CostRule::ByLimit { cost, tiers }
            }
            fixed => fixed,
        };
        self.rules.insert(key.into(), rule);
        Ok(())
    }

    /// Cost of calling `key`, falling back to the default for unknown endpoints
    pub fn cost(&self, key: &str, limit: Option<u64>) -> f64 {
        self.rules.get(key).map_or(self.default_cost, |rule| rule.resolve(limit))
    }

    /// Cost of `method path`
    pub fn cost_of(&self, method: &str, path: &str, limit: Option<u64>) -> f64 {
        self.cost(&endpoint_key(method, path), limit)
    }

    /// Cost charged for endpoints without a rule
    pub fn default_cost(&self) -> f64 {
        self.default_cost
    }

    /// Number of endpoints with a rule
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no endpoint has a rule
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for EndpointCosts {
    fn default() -> Self {
        Self { default_cost: DEFAULT_COST, rules: HashMap::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointCostsSettings {
    #[serde(default)]
    default_cost: Option<f64>,
    #[serde(default)]
    endpoints: HashMap<String, CostRule>,
}

impl TryFrom<EndpointCostsSettings> for EndpointCosts {
    type Error = ThrottleError;

    fn try_from(settings: EndpointCostsSettings) -> Result<Self> {
        let mut costs = EndpointCosts::new(settings.default_cost.unwrap_or(DEFAULT_COST))?;
        for (key, rule) in settings.endpoints {
            costs.insert(key, rule)?;
        }
        Ok(costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_rule() -> CostRule {
        CostRule::ByLimit { cost: 5.0, tiers: vec![(100, 5.0), (500, 25.0), (1000, 50.0), (5000, 250.0)] }
    }

    #[test]
    fn test_fixed_rule() {
        assert_eq!(CostRule::Fixed(2.0).resolve(None), 2.0);
        assert_eq!(CostRule::Fixed(2.0).resolve(Some(1000)), 2.0);
    }

    #[test]
    fn test_by_limit_tiers() {
        let rule = depth_rule();

        assert_eq!(rule.resolve(None), 5.0);
        assert_eq!(rule.resolve(Some(5)), 5.0);
        assert_eq!(rule.resolve(Some(100)), 5.0);
        assert_eq!(rule.resolve(Some(101)), 25.0);
        assert_eq!(rule.resolve(Some(1000)), 50.0);
        assert_eq!(rule.resolve(Some(5000)), 250.0);
        // Above every tier: most expensive tier
        assert_eq!(rule.resolve(Some(10_000)), 250.0);
    }

    #[test]
    fn test_table_lookup() {
        let costs = EndpointCosts::new(1.0)
            .unwrap()
            .with_rule("GET /api/v3/depth", depth_rule())
            .unwrap()
            .with_rule("GET /api/v3/exchangeInfo", CostRule::Fixed(20.0))
            .unwrap();

        assert_eq!(costs.len(), 2);
        assert_eq!(costs.cost("GET /api/v3/exchangeInfo", None), 20.0);
        assert_eq!(costs.cost_of("get", "/api/v3/depth", Some(500)), 25.0);
        assert_eq!(costs.cost("GET /api/v3/unknown", None), 1.0);
    }

    #[test]
    fn test_insert_sorts_tiers() {
        let mut costs = EndpointCosts::default();
        costs.insert("GET /depth", CostRule::ByLimit { cost: 1.0, tiers: vec![(500, 10.0), (100, 2.0)] }).unwrap();

        assert_eq!(costs.cost("GET /depth", Some(50)), 2.0);
        assert_eq!(costs.cost("GET /depth", Some(200)), 10.0);
    }

    #[test]
    fn test_rejects_negative_costs() {
        assert!(EndpointCosts::new(-1.0).is_err());

        let mut costs = EndpointCosts::default();
        assert!(costs.insert("GET /a", CostRule::Fixed(-2.0)).is_err());
        assert!(costs.insert("GET /b", CostRule::ByLimit { cost: 1.0, tiers: vec![(10, f64::NAN)] }).is_err());
        assert!(costs.is_empty());
    }

    #[test]
    fn test_parse_cost() {
        assert_eq!(parse_cost("2.5").unwrap(), 2.5);
        assert_eq!(parse_cost(" 1 ").unwrap(), 1.0);
        assert!(parse_cost("abc").is_err());
        assert!(parse_cost("-1").is_err());
    }

    #[test]
    fn test_endpoint_key() {
        assert_eq!(endpoint_key("post", "/api/v3/order"), "POST /api/v3/order");
    }

    #[test]
    fn test_deserialize_table() {
        let costs: EndpointCosts = toml::from_str(
            r#"
            default_cost = 2

            [endpoints]
            "GET /ticker" = 1
            "GET /trades" = "0.5"
            "GET /depth" = { cost = 5, by_limit = [[500, 25], [100, 5]] }
            "#,
        )
        .unwrap();

        assert_eq!(costs.default_cost(), 2.0);
        assert_eq!(costs.cost("GET /ticker", None), 1.0);
        assert_eq!(costs.cost("GET /trades", None), 0.5);
        assert_eq!(costs.cost("GET /depth", Some(200)), 25.0);
        assert_eq!(costs.cost("GET /other", None), 2.0);
    }

    #[test]
    fn test_deserialize_rejects_bad_cost() {
        let result: std::result::Result<EndpointCosts, _> = toml::from_str("[endpoints]\n\"GET /a\" = -3\n");
        assert!(result.is_err());

        let result: std::result::Result<EndpointCosts, _> = toml::from_str("[endpoints]\n\"GET /a\" = \"lots\"\n");
        assert!(result.is_err());
    }
}
