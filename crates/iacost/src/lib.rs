//! # iacost - infrastructure-as-code cost detection
//!
//! Turns a path (a plan, a state snapshot, a CloudFormation template or a directory of Terraform/Terragrunt
//! configuration) into priceable projects and maps their resources to cost components.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `iacost` works internally.
//!
//! ### Terms
//!
//! - a `root` is a directory of `.tf` files that is deployed on its own (as opposed to a module it calls)
//! - a `nested tool` root is a Terragrunt directory wrapping a Terraform module
//! - an `overlay file` is a `.tfvars`/`.tfvars.json` file supplying variable values to a root
//! - an `environment` is a named set of overlay files (`staging.tfvars`, `prod.tfvars`, ...)
//! - a `unit of work` is one artifact, or one root together with the overlay files of one environment
//!
//! ### Classification
//!
//! see [format::Sniffer::classify]
//!
//! A path is probed in a fixed order and the first match wins. Probes never fail; an unreadable or malformed file
//! simply does not match. The CloudFormation probe goes through [template::gate], the only place templates are
//! parsed, which serializes all template parsing in the process.
//!
//! ### Finding roots
//!
//! see [locator::ProjectLocator::find_roots]
//!
//! A directory that is not a single artifact is walked for roots. Directories called as local modules are pruned,
//! Terragrunt directories are recorded without descending into them and overlay files are attached to the closest
//! root above them.
//!
//! ### Environments
//!
//! see [environment::group]
//!
//! The overlay files of a root are split by naming convention:
//!
//! | **file**                    | **applies to**   |
//! |-----------------------------|------------------|
//! | `terraform.tfvars`          | all environments |
//! | `common.auto.tfvars`        | all environments |
//! | `staging.tfvars`            | `staging`        |
//! | `prod-eu.tfvars`            | `prod-eu`        |
//! | `prod/terraform.tfvars`     | `prod`           |
//!
//! Global files come first, so a value set by an environment file wins.
//!
//! ### Providers
//!
//! see [detect::detect] and [provider::build_providers]
//!
//! Every unit of work becomes a [provider::Provider]. Plans and state are read from JSON, Terraform directories are
//! evaluated statically with [hcl::eval] (variables, locals, `count`/`for_each`, local modules). Units are built on a
//! worker pool; a unit that fails is logged and skipped.
//!
//! ### Dispatch
//!
//! see [registry::Registry::dispatch]
//!
//! Every [schema::ResourceDeclaration] is looked up in the [registry::Registry] by resource type. The adapter checks
//! the [schema::SchemaHandle] variant it was given, merges the usage overlay and builds a [schema::CostResource].
//! Resources without an adapter and handles of the wrong shape are skipped, never fatal.
pub mod config;
pub mod detect;
pub mod environment;
pub mod format;
pub mod hcl_files;
pub mod locator;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod schema;
pub mod template;
pub mod usage;
pub mod value;
