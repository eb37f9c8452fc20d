use mesosync_core::{AppError, AppResult, NonEmptyString};

use crate::address::AddressOrder;
use crate::admission::AdmissionPolicy;
use crate::naming::NameNormalizer;
use crate::tags::TagRuleSet;

/// Raw registration settings as supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationPolicyInput {
    /// Prefix of every service identifier produced by this process.
    pub service_id_prefix: String,
    /// Registry name used for master and agent entries.
    pub host_service_name: String,
    /// Address source names in resolution order.
    pub address_order: Vec<String>,
    /// Framework allow patterns.
    pub framework_allow: Vec<String>,
    /// Framework deny patterns.
    pub framework_deny: Vec<String>,
    /// Task allow patterns.
    pub task_allow: Vec<String>,
    /// Task deny patterns.
    pub task_deny: Vec<String>,
    /// Replacement for underscores in normalized names.
    pub separator: String,
    /// `pattern:tag1,tag2` tag rules.
    pub task_tags: Vec<String>,
    /// Name extraction patterns.
    pub name_patterns: Vec<String>,
}

/// Immutable, validated registration settings consulted for every task.
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    service_id_prefix: NonEmptyString,
    host_service_name: NonEmptyString,
    address_order: AddressOrder,
    framework_admission: AdmissionPolicy,
    task_admission: AdmissionPolicy,
    normalizer: NameNormalizer,
    tag_rules: TagRuleSet,
}

impl RegistrationPolicy {
    /// Validates raw settings.
    ///
    /// Every failure is a configuration error.
    pub fn new(input: RegistrationPolicyInput) -> AppResult<Self> {
        let RegistrationPolicyInput {
            service_id_prefix,
            host_service_name,
            address_order,
            framework_allow,
            framework_deny,
            task_allow,
            task_deny,
            separator,
            task_tags,
            name_patterns,
        } = input;

        if service_id_prefix.contains(':') {
            return Err(AppError::Validation(format!(
                "service id prefix '{service_id_prefix}' must not contain ':'"
            )));
        }

        Ok(Self {
            service_id_prefix: NonEmptyString::new(service_id_prefix)?,
            host_service_name: NonEmptyString::new(host_service_name)?,
            address_order: AddressOrder::parse(&address_order)?,
            framework_admission: AdmissionPolicy::new(&framework_allow, &framework_deny)?,
            task_admission: AdmissionPolicy::new(&task_allow, &task_deny)?,
            normalizer: NameNormalizer::new(separator, &name_patterns)?,
            tag_rules: TagRuleSet::parse(&task_tags)?,
        })
    }

    /// Returns the service identifier prefix.
    #[must_use]
    pub fn service_id_prefix(&self) -> &str {
        self.service_id_prefix.as_str()
    }

    /// Returns the registry name of master and agent entries.
    #[must_use]
    pub fn host_service_name(&self) -> &str {
        self.host_service_name.as_str()
    }

    /// Returns the address resolution order.
    #[must_use]
    pub fn address_order(&self) -> &AddressOrder {
        &self.address_order
    }

    /// Returns the framework admission policy.
    #[must_use]
    pub fn framework_admission(&self) -> &AdmissionPolicy {
        &self.framework_admission
    }

    /// Returns the task admission policy.
    #[must_use]
    pub fn task_admission(&self) -> &AdmissionPolicy {
        &self.task_admission
    }

    /// Returns the name normalizer.
    #[must_use]
    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    /// Returns the tag rules.
    #[must_use]
    pub fn tag_rules(&self) -> &TagRuleSet {
        &self.tag_rules
    }
}
