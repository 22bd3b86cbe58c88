//! # 取色会话模块（session）
//!
//! ## 设计思路
//!
//! 会话是一个显式状态机：`Empty → Loaded → Editing`，只由四条命令驱动：
//!
//! - `LoadImage`：换图并重新计算样本、主色与元数据；同一张图重复载入不做任何事
//! - `PickPixel`：在坐标处取色；与上一次坐标相同视为重复事件
//! - `EditSwatch`：替换主色或取色结果中的某一项，不重新聚类
//! - `Reset`：回到空会话
//!
//! ## 实现思路
//!
//! `apply` 是纯函数式的：不修改当前会话，成功时返回新会话和结果。
//! 服务层持锁完成“计算 → 替换”，因此失败的命令不会留下半更新的状态。

mod command;
mod error;
mod state;
mod view;

pub use command::{Coordinate, Outcome, SessionCommand, SwatchTarget};
pub use error::SessionError;
pub use state::{ActiveImage, Phase, Session, Transition};
pub use view::SessionView;
