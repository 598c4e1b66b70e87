//! Assertion macros shared by the suites

/// Unwrap an `Ok`, failing the test with the error otherwise
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{} failed: {:?}", stringify!($result), e),
        }
    };
}

/// Expect an `Err` matching `$pattern`
#[macro_export]
macro_rules! assert_err {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            other => panic!(
                "{} returned {:?}, expected Err({})",
                stringify!($result),
                other,
                stringify!($pattern)
            ),
        }
    };
}

/// Expect a node to have a position inside the default canvas
#[macro_export]
macro_rules! assert_on_canvas {
    ($node:expr) => {{
        let node = &$node;
        let (x, y) = match (node.x, node.y) {
            (Some(x), Some(y)) => (x, y),
            _ => panic!("node {} has no position", node.id),
        };
        assert!(
            (0.0..=5000.0).contains(&x) && (0.0..=5000.0).contains(&y),
            "node {} at ({}, {}) is off the canvas",
            node.id,
            x,
            y
        );
    }};
}
