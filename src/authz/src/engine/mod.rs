//! Method authorizer
//!
//! Resolves the rule set for a method, renders each rule into a required
//! permission and matches the required permissions against the ones the
//! principal holds.

pub mod decision;

pub use decision::{Decision, DecisionReason};

use crate::error::{AuthzError, Result};
use crate::expression::{join_metadata, EvalContext, Expression};
use crate::matcher::{WildcardMatcher, DEFAULT_PATTERN_CACHE_CAPACITY};
use crate::types::{service_name, CallParams, RuleMap, RuleSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use tracing::{debug, info, warn};

/// Handling of methods absent from the rule mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredPolicy {
    /// Allow when another method of the same service is configured, deny otherwise
    ///
    /// Services are compared by the leading path segment of the method
    /// identifier, so every unannotated method of a partially annotated
    /// service is reachable.
    #[default]
    ServiceFallback,

    /// Deny every unconfigured method
    Deny,

    /// Allow every unconfigured method
    Allow,
}

/// Authorizer configuration
#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    /// Decision for methods without a rule set
    pub unconfigured_policy: UnconfiguredPolicy,

    /// Cache compiled held-permission patterns
    pub enable_pattern_cache: bool,

    /// Maximum number of cached patterns
    pub pattern_cache_capacity: usize,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            unconfigured_policy: UnconfiguredPolicy::ServiceFallback,
            enable_pattern_cache: true,
            pattern_cache_capacity: DEFAULT_PATTERN_CACHE_CAPACITY,
        }
    }
}

/// Evaluation strategy over a method → rule set mapping
///
/// Alternative backends evaluate the same mapping shape differently; callers
/// depend on this trait rather than on a concrete authorizer.
pub trait MethodAuthorizer: Send + Sync {
    /// Whether the call to `method` is allowed
    fn authorize_method(&self, method: &str, params: &CallParams<'_>) -> Result<bool>;
}

/// Rule set prepared at load time
struct CompiledRuleSet {
    /// Parsed rule expressions, in rule order
    expressions: Vec<Expression>,

    /// Rule set view, exposed to expressions as `rule`
    view: Value,
}

/// Rule set as seen from expressions, e.g. `${rule.Rules.0.Expression}`
///
/// Field names are capitalized to match the RPC message fields, unlike the
/// lowercase keys of the JSON rule mapping.
fn rule_view(rule_set: &RuleSet) -> Value {
    let rules = rule_set
        .rules
        .iter()
        .map(|rule| json!({ "Expression": rule.expression }))
        .collect::<Vec<_>>();
    json!({ "Rules": rules })
}

impl CompiledRuleSet {
    /// Per-call context with this rule set as the `rule` root
    fn eval_context<'a>(&'a self, params: &'a CallParams<'_>) -> EvalContext<'a> {
        EvalContext {
            metadata: join_metadata(&params.metadata),
            request: &params.request,
            user: params.user.attributes(),
            rule: &self.view,
        }
    }

    /// Required permissions, in rule order
    fn render(&self, ctx: &EvalContext<'_>) -> Vec<String> {
        self.expressions
            .iter()
            .map(|expression| expression.render(ctx))
            .collect()
    }
}

/// Permission-matching authorizer
///
/// The rule mapping is validated and compiled once in the constructor and
/// never mutated afterwards, so a single authorizer can serve any number of
/// threads.
///
/// # Architecture
///
/// ```text
/// method → RuleSet → EvalContext → render rules → required permissions
///                         ↓                              ↓
///                   Principal ──→ held permissions ──→ WildcardMatcher → Decision
/// ```
pub struct MatchAuthorizer {
    /// Compiled rule sets by method identifier
    rules: HashMap<String, CompiledRuleSet>,

    /// Services with at least one configured method
    services: HashSet<String>,

    /// Held-permission matcher
    matcher: WildcardMatcher,

    /// Authorizer configuration
    config: AuthorizerConfig,
}

impl MatchAuthorizer {
    /// Create an authorizer with the default configuration
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Configuration`] if any rule expression is invalid.
    pub fn new(rules: RuleMap) -> Result<Self> {
        Self::with_config(rules, AuthorizerConfig::default())
    }

    /// Create an authorizer with the given configuration
    pub fn with_config(rules: RuleMap, config: AuthorizerConfig) -> Result<Self> {
        let mut compiled = HashMap::with_capacity(rules.len());

        for (method, rule_set) in rules {
            let expressions = rule_set
                .rules
                .iter()
                .map(|rule| {
                    Expression::parse(&rule.expression).map_err(|source| {
                        AuthzError::Configuration {
                            method: method.clone(),
                            expression: rule.expression.clone(),
                            source,
                        }
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let view = rule_view(&rule_set);
            debug!("Registered {} rule(s) for {}", expressions.len(), method);
            compiled.insert(method, CompiledRuleSet { expressions, view });
        }

        let services = compiled
            .keys()
            .map(|method| service_name(method).to_string())
            .collect::<HashSet<_>>();

        let matcher = if config.enable_pattern_cache {
            WildcardMatcher::with_cache(config.pattern_cache_capacity)
        } else {
            WildcardMatcher::new()
        };

        info!(
            "MatchAuthorizer initialized with methods={}, services={}, unconfigured_policy={:?}, pattern_cache={}",
            compiled.len(),
            services.len(),
            config.unconfigured_policy,
            config.enable_pattern_cache
        );

        Ok(Self {
            rules: compiled,
            services,
            matcher,
            config,
        })
    }

    /// Create an authorizer from a JSON rule mapping
    ///
    /// The mapping has the shape `{"/pkg.Service/Method": {"rules": [{"expression": "…"}]}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: RuleMap = serde_json::from_str(json)?;
        Self::new(rules)
    }

    /// Create an authorizer from a JSON rule mapping read from `reader`
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let rules: RuleMap = serde_json::from_reader(reader)?;
        Self::new(rules)
    }

    /// Authorize a method call
    ///
    /// # Pipeline
    ///
    /// 1. Look up the method's rule set, or apply the unconfigured policy
    /// 2. Build the evaluation context
    /// 3. Extract the principal's permissions
    /// 4. Render every rule into a required permission
    /// 5. Allow on the first (required, held) pair that matches
    ///
    /// # Errors
    ///
    /// Extraction failures, an empty permission list and pattern compile
    /// failures are errors, distinct from a deny decision.
    pub fn decide(&self, method: &str, params: &CallParams<'_>) -> Result<Decision> {
        debug!("Authorization request: method={}", method);

        // Step 1: Resolve rule set
        let Some(rule_set) = self.rules.get(method) else {
            return Ok(self.unconfigured_decision(method));
        };

        // Step 2: Build evaluation context
        let ctx = rule_set.eval_context(params);

        // Step 3: Extract held permissions
        let held = params.user.permissions().map_err(|e| {
            warn!("Permission extraction failed for {}: {}", method, e);
            AuthzError::PermissionExtractionFailed(e)
        })?;

        if held.is_empty() {
            warn!("Principal holds no permissions for {}", method);
            return Err(AuthzError::NoPermissions);
        }

        // Step 4: Render required permissions
        let required = rule_set.render(&ctx);

        debug!("Required permissions: {:?}", required);

        // Step 5: Match
        let decision = match self.matcher.find_match(&required, &held)? {
            Some((need, grant)) => Decision::allow(DecisionReason::PermissionMatched {
                required: need.to_string(),
                held: grant.to_string(),
            }),
            None => Decision::deny(DecisionReason::NoMatchingPermission { required }),
        };

        debug!(
            "Decision: {} for {}",
            if decision.allowed { "ALLOW" } else { "DENY" },
            method
        );

        Ok(decision)
    }

    /// Authorize a method call, returning only allow/deny
    pub fn authorize_method(&self, method: &str, params: &CallParams<'_>) -> Result<bool> {
        self.decide(method, params).map(|decision| decision.allowed)
    }

    /// Render the required permissions for a call without matching them
    ///
    /// Returns `None` for unconfigured methods.
    pub fn required_permissions(&self, method: &str, params: &CallParams<'_>) -> Option<Vec<String>> {
        let rule_set = self.rules.get(method)?;
        Some(rule_set.render(&rule_set.eval_context(params)))
    }

    /// Whether `method` has a rule set
    pub fn is_configured(&self, method: &str) -> bool {
        self.rules.contains_key(method)
    }

    /// Configured method identifiers
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Authorizer configuration
    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Get pattern cache statistics
    pub fn pattern_cache_stats(&self) -> crate::matcher::CacheStats {
        self.matcher.cache_stats()
    }

    fn unconfigured_decision(&self, method: &str) -> Decision {
        match self.config.unconfigured_policy {
            UnconfiguredPolicy::Allow => {
                debug!("No rules for {}, default allow", method);
                Decision::allow(DecisionReason::UnconfiguredMethod)
            }
            UnconfiguredPolicy::Deny => {
                debug!("No rules for {}, default deny", method);
                Decision::deny(DecisionReason::UnconfiguredMethod)
            }
            UnconfiguredPolicy::ServiceFallback => {
                let service = service_name(method);
                if self.services.contains(service) {
                    debug!("No rules for {}, service {} is known, allow", method, service);
                    Decision::allow(DecisionReason::ServiceFallback {
                        service: service.to_string(),
                    })
                } else {
                    debug!("No rules for {}, service {} is unknown, deny", method, service);
                    Decision::deny(DecisionReason::UnknownService {
                        service: service.to_string(),
                    })
                }
            }
        }
    }
}

impl MethodAuthorizer for MatchAuthorizer {
    fn authorize_method(&self, method: &str, params: &CallParams<'_>) -> Result<bool> {
        MatchAuthorizer::authorize_method(self, method, params)
    }
}
