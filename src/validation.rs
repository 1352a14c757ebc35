//! Form checks run before any network call.

use crate::models::packages::{MAX_PACKAGE_AMOUNT, MIN_PACKAGE_AMOUNT};
use crate::models::session::{SignInForm, SignUpForm};

pub const MIN_BONUS_WITHDRAWAL: f64 = 10.0;
pub const MAX_BONUS_WITHDRAWAL: f64 = 500.0;
pub const PIN_LENGTH: usize = 6;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Package amount must be between $50 and $1000.")]
    PackageAmount,
    #[error("Bonus withdrawal must be between $10 and $500.")]
    BonusAmount,
    #[error("Withdrawal amount must be greater than zero.")]
    YieldAmount,
    #[error("A wallet address is required.")]
    WalletRequired,
    #[error("An active or completed package is required to withdraw yields.")]
    NoQualifyingPackage,
    #[error("PIN and confirmation are required.")]
    PinRequired,
    #[error("PIN must be exactly 6 digits.")]
    PinFormat,
    #[error("PINs do not match.")]
    PinMismatch,
    #[error("Email and password are required.")]
    CredentialsRequired,
    #[error("Email, password, confirmation and username are required.")]
    SignUpFieldsRequired,
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Password must be at least 6 characters.")]
    PasswordTooShort,
    #[error("Username is required.")]
    UsernameRequired,
    #[error("Only image files are allowed.")]
    NotAnImage,
    #[error("Image must be at most {0} bytes.")]
    AvatarTooLarge(u64),
}

pub fn package_amount(amount: f64) -> Result<f64, ValidationError> {
    if !amount.is_finite() || !(MIN_PACKAGE_AMOUNT..=MAX_PACKAGE_AMOUNT).contains(&amount) {
        return Err(ValidationError::PackageAmount);
    }

    Ok(amount)
}

/// Returns the trimmed wallet identifier.
pub fn wallet(wallet_hash: &str) -> Result<String, ValidationError> {
    let wallet_hash = wallet_hash.trim();
    if wallet_hash.is_empty() {
        return Err(ValidationError::WalletRequired);
    }

    Ok(wallet_hash.to_string())
}

pub fn bonus_withdrawal(amount: f64, wallet_hash: &str) -> Result<String, ValidationError> {
    if !amount.is_finite() || !(MIN_BONUS_WITHDRAWAL..=MAX_BONUS_WITHDRAWAL).contains(&amount) {
        return Err(ValidationError::BonusAmount);
    }

    wallet(wallet_hash)
}

pub fn yield_withdrawal(amount: f64, wallet_hash: &str) -> Result<String, ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::YieldAmount);
    }

    wallet(wallet_hash)
}

pub fn pin(pin: &str, confirm_pin: &str) -> Result<(), ValidationError> {
    if pin.is_empty() || confirm_pin.is_empty() {
        return Err(ValidationError::PinRequired);
    }

    if pin.len() != PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PinFormat);
    }

    if pin != confirm_pin {
        return Err(ValidationError::PinMismatch);
    }

    Ok(())
}

pub fn sign_in(form: &SignInForm) -> Result<(), ValidationError> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(ValidationError::CredentialsRequired);
    }

    Ok(())
}

pub fn sign_up(form: &SignUpForm) -> Result<(), ValidationError> {
    if form.email.trim().is_empty()
        || form.password.is_empty()
        || form.confirm_password.is_empty()
        || form.username.trim().is_empty()
    {
        return Err(ValidationError::SignUpFieldsRequired);
    }

    if form.password != form.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }

    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }

    Ok(())
}

pub fn username(username: &str) -> Result<String, ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::UsernameRequired);
    }

    Ok(username.to_string())
}

pub fn avatar(content_type: &str, size: u64, max_bytes: u64) -> Result<(), ValidationError> {
    if !content_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage);
    }

    if size > max_bytes {
        return Err(ValidationError::AvatarTooLarge(max_bytes));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_amount_bounds() {
        assert_eq!(package_amount(49.99), Err(ValidationError::PackageAmount));
        assert_eq!(package_amount(50.0), Ok(50.0));
        assert_eq!(package_amount(1000.0), Ok(1000.0));
        assert_eq!(package_amount(1000.01), Err(ValidationError::PackageAmount));
        assert_eq!(package_amount(f64::NAN), Err(ValidationError::PackageAmount));
    }

    #[test]
    fn bonus_withdrawal_bounds() {
        assert_eq!(bonus_withdrawal(9.99, "0xabc"), Err(ValidationError::BonusAmount));
        assert_eq!(bonus_withdrawal(10.0, "0xabc"), Ok("0xabc".to_string()));
        assert_eq!(bonus_withdrawal(500.0, " 0xabc "), Ok("0xabc".to_string()));
        assert_eq!(bonus_withdrawal(500.01, "0xabc"), Err(ValidationError::BonusAmount));
        assert_eq!(
            bonus_withdrawal(f64::INFINITY, "0xabc"),
            Err(ValidationError::BonusAmount)
        );
    }

    #[test]
    fn blank_wallet_is_rejected_for_any_amount() {
        assert_eq!(bonus_withdrawal(100.0, ""), Err(ValidationError::WalletRequired));
        assert_eq!(bonus_withdrawal(100.0, "   "), Err(ValidationError::WalletRequired));
        assert_eq!(yield_withdrawal(5.0, "\t"), Err(ValidationError::WalletRequired));
    }

    #[test]
    fn yield_amount_must_be_positive() {
        assert_eq!(yield_withdrawal(0.0, "0xabc"), Err(ValidationError::YieldAmount));
        assert_eq!(yield_withdrawal(-1.0, "0xabc"), Err(ValidationError::YieldAmount));
        assert_eq!(yield_withdrawal(0.01, "0xabc"), Ok("0xabc".to_string()));
    }

    #[test]
    fn pin_rules() {
        assert_eq!(pin("", "123456"), Err(ValidationError::PinRequired));
        assert_eq!(pin("12345", "12345"), Err(ValidationError::PinFormat));
        assert_eq!(pin("1234567", "1234567"), Err(ValidationError::PinFormat));
        assert_eq!(pin("12a456", "12a456"), Err(ValidationError::PinFormat));
        assert_eq!(pin("١٢٣٤٥٦", "١٢٣٤٥٦"), Err(ValidationError::PinFormat));
        assert_eq!(pin("123456", "654321"), Err(ValidationError::PinMismatch));
        assert_eq!(pin("123456", "123456"), Ok(()));
    }

    #[test]
    fn sign_up_rules() {
        let mut form = SignUpForm {
            email: "a@b.c".to_string(),
            password: "secret".to_string(),
            confirm_password: "secret".to_string(),
            name: String::new(),
            username: "alice".to_string(),
        };
        assert_eq!(sign_up(&form), Ok(()));

        form.confirm_password = "secreT".to_string();
        assert_eq!(sign_up(&form), Err(ValidationError::PasswordMismatch));

        form.password = "abc".to_string();
        form.confirm_password = "abc".to_string();
        assert_eq!(sign_up(&form), Err(ValidationError::PasswordTooShort));

        form.username = " ".to_string();
        assert_eq!(sign_up(&form), Err(ValidationError::SignUpFieldsRequired));
    }

    #[test]
    fn sign_in_requires_both_fields() {
        let form = SignInForm {
            email: "a@b.c".to_string(),
            password: String::new(),
        };
        assert_eq!(sign_in(&form), Err(ValidationError::CredentialsRequired));
    }

    #[test]
    fn avatar_rules() {
        assert_eq!(avatar("application/pdf", 10, 100), Err(ValidationError::NotAnImage));
        assert_eq!(avatar("image/png", 101, 100), Err(ValidationError::AvatarTooLarge(100)));
        assert_eq!(avatar("image/png", 100, 100), Ok(()));
    }
}
