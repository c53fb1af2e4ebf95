//! Transfer fee policy.

use super::account::Account;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Charged when sender and receiver bank with different institutions.
pub const CROSS_INSTITUTION_FEE: Decimal = dec!(10.00);

/// Fee for moving money from `sender` to `receiver`.
pub fn transfer_fee(sender: &Account, receiver: &Account) -> Decimal {
    if sender.institution != receiver.institution {
        CROSS_INSTITUTION_FEE
    } else {
        Decimal::ZERO
    }
}

/// Amount debited from the sender.
pub fn total(amount: Decimal, fee: Decimal) -> Decimal {
    amount + fee
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_depends_on_institution() {
        let a = Account::new("1", "KBANK", dec!(0));
        let b = Account::new("2", "SCB", dec!(0));
        let c = Account::new("3", "KBANK", dec!(0));

        assert_eq!(transfer_fee(&a, &b), dec!(10.00));
        assert_eq!(transfer_fee(&a, &c), Decimal::ZERO);
        assert_eq!(total(dec!(1000.00), transfer_fee(&a, &b)), dec!(1010.00));
    }
}
