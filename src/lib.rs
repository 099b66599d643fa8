// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod compress;
pub mod config;
pub mod coord;
pub mod cursor;
pub mod error;
pub mod job;
pub mod manager;
pub mod pyramid;
pub mod sink;
pub mod storage;
pub mod terrain;
pub mod worker;
