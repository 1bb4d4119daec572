//! Named update sets, one per dataset and network variant.
//!
//! Each function returns a fresh immutable value; nothing here is mutated
//! after construction.

use super::{GatingType, ParameterUpdate, Stabilization, TaskKind};

const SAVE_DIR: &str = "./savedir/";

/// 100 sequential MNIST permutations.
pub fn mnist() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[784, 2000, 2000, 10])
        .n_tasks(100)
        .task(TaskKind::Mnist)
        .save_dir(SAVE_DIR)
        .n_train_batches(3906)
        .drop_keep_pct(0.5)
        .input_drop_keep_pct(1.0)
        .multihead(false)
}

/// Single colored-MNIST task; separability starts at zero.
pub fn colored_mnist() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 128, 128, 10])
        .n_tasks(1)
        .task(TaskKind::ColoredMnist)
        .save_dir(SAVE_DIR)
        .n_train_batches(3906)
        .drop_keep_pct(0.5)
        .input_drop_keep_pct(1.0)
        .multihead(false)
        .separability(0.0)
}

/// 20 five-way CIFAR splits.
pub fn cifar() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 1000, 1000, 5])
        .n_tasks(20)
        .task(TaskKind::Cifar)
        .save_dir(SAVE_DIR)
        .n_train_batches(977)
        .input_drop_keep_pct(1.0)
        .drop_keep_pct(0.5)
        .multihead(false)
}

/// 100 ten-way ImageNet splits.
pub fn imagenet() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 2000, 2000, 10])
        .n_tasks(100)
        .task(TaskKind::Imagenet)
        .save_dir(SAVE_DIR)
        .n_train_batches(977 * 2)
        .input_drop_keep_pct(1.0)
        .drop_keep_pct(0.5)
        .multihead(false)
}

/// Multi-head output for CIFAR.
pub fn multihead() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 1000, 1000, 100])
        .multihead(true)
}

/// Multi-head output for ImageNet.
pub fn imagenet_multihead() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 2000, 2000, 1000])
        .multihead(true)
}

pub fn mnist_split() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[784, 3665, 3665, 10])
        .multihead(false)
}

pub fn cifar_split() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 1164, 1164, 5])
        .multihead(false)
}

pub fn imagenet_split() -> ParameterUpdate {
    ParameterUpdate::new()
        .layer_dims(&[4096, 3665, 3665, 10])
        .multihead(false)
}

/// Gating scheme plus the input dropout that goes with it.
pub fn gating(
    gating_type: Option<GatingType>,
    gate_pct: f64,
    input_drop_keep_pct: f64,
) -> ParameterUpdate {
    ParameterUpdate::new()
        .gating_type(gating_type)
        .gate_pct(gate_pct)
        .input_drop_keep_pct(input_drop_keep_pct)
}

pub fn stabilization(method: Stabilization, omega_c: f64, omega_xi: f64) -> ParameterUpdate {
    ParameterUpdate::new()
        .stabilization(method)
        .omega_c(omega_c)
        .omega_xi(omega_xi)
}

pub fn train_conv_layers(train: bool) -> ParameterUpdate {
    ParameterUpdate::new().train_convolutional_layers(train)
}

pub fn separability(sep: f64) -> ParameterUpdate {
    ParameterUpdate::new().separability(sep)
}
