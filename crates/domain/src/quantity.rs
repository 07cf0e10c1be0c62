//! Quantity distribution across selected content items.

use crate::error::DomainError;

/// Splits `total` units across `n` items.
///
/// The first `total % n` items receive `total / n + 1`, the rest receive
/// `total / n`, so the shares depend on item order.
///
/// ```
/// assert_eq!(domain::distribute(17, 5).unwrap(), vec![4, 4, 3, 3, 3]);
/// ```
pub fn distribute(total: u32, n: usize) -> Result<Vec<u32>, DomainError> {
    if n == 0 {
        return Err(DomainError::EmptyDistribution { total });
    }
    let base = (u64::from(total) / n as u64) as u32;
    let remainder = (u64::from(total) % n as u64) as usize;
    Ok((0..n)
        .map(|index| if index < remainder { base + 1 } else { base })
        .collect())
}
