/// Length of a redemption code.
pub const CODE_LEN: usize = 32;

/// A fresh redemption code: 128 random bits as uppercase hex.
pub fn generate_code() -> String {
    format!("{:032X}", rand::random::<u128>())
}
