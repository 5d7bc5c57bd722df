use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use loanbook_core::lending::allocator::{self, AllocationInput, Outstanding};
use loanbook_core::lending::calculator::{self, PenaltyInput, TermsInput};
use loanbook_core::lending::{InterestType, LoanProduct, PenaltyType};
use loanbook_core::EngineConfig;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InterestTypeArg {
    FlatMonthly,
    ReducingBalance,
}

impl From<InterestTypeArg> for InterestType {
    fn from(arg: InterestTypeArg) -> Self {
        match arg {
            InterestTypeArg::FlatMonthly => InterestType::FlatMonthly,
            InterestTypeArg::ReducingBalance => InterestType::ReducingBalance,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PenaltyTypeArg {
    Fixed,
    Percentage,
}

impl From<PenaltyTypeArg> for PenaltyType {
    fn from(arg: PenaltyTypeArg) -> Self {
        match arg {
            PenaltyTypeArg::Fixed => PenaltyType::Fixed,
            PenaltyTypeArg::Percentage => PenaltyType::Percentage,
        }
    }
}

/// Product assembled from command-line flags.
fn ad_hoc_product(
    interest_type: InterestType,
    interest_rate: Decimal,
    max_amount: Decimal,
    default_term_days: u32,
    grace_days: u32,
) -> LoanProduct {
    LoanProduct {
        id: Uuid::nil(),
        name: "ad hoc".into(),
        interest_type,
        interest_rate,
        max_amount,
        min_amount: Decimal::ZERO,
        default_term_days,
        grace_days,
        penalty_type: PenaltyType::Fixed,
        penalty_value: Decimal::ZERO,
        is_active: true,
    }
}

/// Arguments for a loan terms quote
#[derive(Args)]
pub struct TermsArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Principal to lend
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Interest rate as a decimal (0.25 = 25%)
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// How interest accrues
    #[arg(long, value_enum, default_value = "flat-monthly")]
    pub interest_type: InterestTypeArg,

    /// Loan term in days
    #[arg(long, default_value_t = 30)]
    pub term_days: u32,

    /// Grace period after the due date, in days
    #[arg(long, default_value_t = 0)]
    pub grace_days: u32,

    /// Issue date (YYYY-MM-DD); adds due and overdue dates to the quote
    #[arg(long)]
    pub issue_date: Option<NaiveDate>,
}

/// Arguments for a late penalty quote
#[derive(Args)]
pub struct PenaltyArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Outstanding principal the penalty is sized on
    #[arg(long)]
    pub base: Option<Decimal>,

    /// Whole days past the due date
    #[arg(long, allow_hyphen_values = true)]
    pub days_overdue: Option<i64>,

    /// Fixed amount or fraction of the base
    #[arg(long, value_enum, default_value = "fixed")]
    pub penalty_type: PenaltyTypeArg,

    /// Penalty amount (fixed) or fraction (percentage)
    #[arg(long)]
    pub penalty_value: Option<Decimal>,

    /// Grace period after the due date, in days
    #[arg(long, default_value_t = 0)]
    pub grace_days: u32,
}

/// Arguments for a repayment allocation
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Outstanding penalty
    #[arg(long, default_value = "0")]
    pub penalty: Decimal,

    /// Outstanding interest
    #[arg(long, default_value = "0")]
    pub interest: Decimal,

    /// Outstanding principal
    #[arg(long, default_value = "0")]
    pub principal: Decimal,

    /// Amount paid
    #[arg(long)]
    pub amount: Option<Decimal>,
}

pub fn run_terms(args: TermsArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let terms_input: TermsInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => {
            let principal = args
                .principal
                .ok_or("--principal is required (or provide --input)")?;
            let rate = args.rate.ok_or("--rate is required (or provide --input)")?;
            TermsInput {
                product: ad_hoc_product(
                    args.interest_type.into(),
                    rate,
                    principal,
                    args.term_days,
                    args.grace_days,
                ),
                principal,
                term_days: None,
                issue_date: args.issue_date,
            }
        }
    };

    terms_input.product.validate(config.max_interest_rate)?;
    let result = calculator::calculate_terms(&terms_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_penalty(
    args: PenaltyArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let penalty_input = match input::read_input::<PenaltyInput>(args.input.as_deref())? {
        Some(parsed) => {
            parsed.product.validate(config.max_interest_rate)?;
            parsed
        }
        None => {
            let penalty_value = args
                .penalty_value
                .ok_or("--penalty-value is required (or provide --input)")?;
            if penalty_value < Decimal::ZERO {
                return Err("--penalty-value cannot be negative".into());
            }
            let mut product = ad_hoc_product(
                InterestType::FlatMonthly,
                Decimal::ZERO,
                Decimal::ZERO,
                1,
                args.grace_days,
            );
            product.penalty_type = args.penalty_type.into();
            product.penalty_value = penalty_value;
            PenaltyInput {
                product,
                base: args.base.ok_or("--base is required (or provide --input)")?,
                days_overdue: args
                    .days_overdue
                    .ok_or("--days-overdue is required (or provide --input)")?,
            }
        }
    };

    let result = calculator::calculate_penalty(&penalty_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let allocation_input: AllocationInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => AllocationInput {
            outstanding: Outstanding {
                penalty: args.penalty,
                interest: args.interest,
                principal: args.principal,
            },
            amount_paid: args.amount.ok_or("--amount is required (or provide --input)")?,
        },
    };

    let result = allocator::allocate_repayment(&allocation_input)?;
    Ok(serde_json::to_value(result)?)
}
