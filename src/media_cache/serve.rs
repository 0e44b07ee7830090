use std::path::PathBuf;

use rand::Rng;
use rand::seq::IndexedRandom;

use super::fetch::MediaCache;
use super::group::Group;

impl<C> MediaCache<C> {
    /// 从该分组已完成且文件仍存在的条目中均匀随机取一个；`None` 表示仍在准备。
    pub fn pick_for_group(&self, group: Group) -> Option<PathBuf> {
        pick_random(&self.done_paths(group), &mut rand::rng())
    }
}

fn pick_random<R: Rng + ?Sized>(candidates: &[PathBuf], rng: &mut R) -> Option<PathBuf> {
    candidates.choose(rng).cloned()
}
