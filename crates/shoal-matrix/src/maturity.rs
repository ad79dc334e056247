//! The maturation hook used during growth.

/// Decides which share of fish landing in a length group during growth
/// leaves the immature stock.
///
/// Implemented by the maturation rules of the model layer. Closures with
/// the matching signature implement it too, which keeps tests short.
pub trait MaturityRule {
    /// Share in `[0, 1]` of fish of `age` that grew into `length_group`
    /// by `jump` groups and mature during this step.
    fn maturing_share(&self, age: u32, length_group: usize, jump: usize) -> f64;
}

impl<F> MaturityRule for F
where
    F: Fn(u32, usize, usize) -> f64,
{
    fn maturing_share(&self, age: u32, length_group: usize, jump: usize) -> f64 {
        self(age, length_group, jump)
    }
}
