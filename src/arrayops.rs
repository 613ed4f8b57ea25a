use num_traits::Float;

/// Element-wise `a - b`
pub fn subtract<T: Float>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().zip(b.iter()).map(|(x, y)| *x - *y).collect()
}

/// Sum of absolute values
pub fn abs_sum<T: Float>(values: &[T]) -> T {
    values.iter().fold(T::zero(), |acc, v| acc + v.abs())
}

pub fn minmax<T: Float>(values: &[T]) -> (T, T) {
    let mut max = -T::infinity();
    let mut min = T::infinity();

    for v in values.iter() {
        if *v > max {
            max = *v;
        }
        if *v < min {
            min = *v
        }
    }
    (min, max)
}
