//! The balance-sheet rule catalog.
//!
//! One module per control (a few controls share an evaluator and live
//! together). Every rule is independent: rules share only the domain model
//! and utilities, never each other's state. Registration order here is the
//! execution and report order.

pub mod aged_items;
pub mod balance_unchanged;
pub mod bank_reconciled;
pub mod clearing_non_sales;
pub mod intercompany;
pub mod negative_open_items;
pub mod petty_cash;
pub mod plooto;
pub mod statement_match;
pub mod subledger;
pub mod tax_filings;
pub mod tax_payable;
pub mod uncleared_items;
pub mod working_paper;
pub mod year_end_batch;
pub mod zero_balance;

use crate::error::RegistryError;
use crate::registry::RuleRegistry;

/// Register the built-in catalog. Call once at startup; duplicate
/// registration fails loudly.
pub fn register_builtin_rules(registry: &mut RuleRegistry) -> Result<(), RegistryError> {
    registry.register(Box::new(bank_reconciled::BankReconciledThroughPeriodEnd))?;
    registry.register(Box::new(uncleared_items::UnclearedItemsInvestigatedAndFlagged))?;
    registry.register(Box::new(zero_balance::UndepositedFundsZero))?;
    registry.register(Box::new(zero_balance::ClearingAccountsZero))?;
    registry.register(Box::new(clearing_non_sales::ClearingAccountsNonSalesZero))?;
    registry.register(Box::new(plooto::PlootoClearingZero))?;
    registry.register(Box::new(plooto::PlootoInstantBalanceDisclosure))?;
    registry.register(Box::new(petty_cash::PettyCashMatch))?;
    registry.register(Box::new(subledger::ApSubledgerReconciles))?;
    registry.register(Box::new(subledger::ArSubledgerReconciles))?;
    registry.register(Box::new(aged_items::ApArItemsOlderThanThreshold))?;
    registry.register(Box::new(negative_open_items::ApArNegativeOpenItems))?;
    registry.register(Box::new(intercompany::ApArIntercompanyOrShareholderPaid))?;
    registry.register(Box::new(year_end_batch::ApArYearEndBatchAdjustments))?;
    registry.register(Box::new(intercompany::IntercompanyBalancesReconcile))?;
    registry.register(Box::new(statement_match::LoanBalanceMatch))?;
    registry.register(Box::new(statement_match::InvestmentBalanceMatch))?;
    registry.register(Box::new(working_paper::WorkingPaperReconciles))?;
    registry.register(Box::new(tax_filings::TaxFilingsUpToDate))?;
    registry.register(Box::new(tax_payable::TaxPayableAndSuspenseReconcileToReturn))?;
    registry.register(Box::new(balance_unchanged::BalanceUnchangedPriorMonth))?;
    Ok(())
}

/// Case-insensitive substring match. Whitespace is significant.
pub(crate) fn name_contains(name: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Case-insensitive match against any pattern in the list.
pub(crate) fn name_matches_any(name: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|p| !p.trim().is_empty() && name_contains(name, p.trim()))
}

/// Match `token` (e.g. `a/p`) as a full token: the characters around the
/// occurrence must not be alphanumeric, so `a/p` does not match inside a
/// longer word.
pub(crate) fn contains_token(name: &str, token: &str) -> bool {
    let haystack = name.to_lowercase();
    let needle = token.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(found) = haystack[start..].find(&needle) {
        let at = start + found;
        let before_ok = at == 0
            || !haystack[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = at + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = at + needle.len();
    }
    false
}
